//! Repository layer: entity-scoped database operations over a borrowed
//! `Connection`. Higher layers go through `SqliteStore`, which owns the
//! connection and implements the pipeline's storage traits.

pub mod clinical;
pub mod history;
pub mod pdf_artifact;

pub use clinical::*;
pub use history::{delete_history, get_history, insert_history, list_histories_for_patient};
pub use pdf_artifact::*;
