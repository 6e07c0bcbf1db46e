pub mod enums;
pub mod history;
pub mod patient;

pub use history::*;
pub use patient::*;
