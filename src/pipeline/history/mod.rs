//! History generation: fact aggregation, prompt construction and the
//! orchestrator that ties them to the generation client and the store.

pub mod aggregate;
pub mod orchestrator;
pub mod prompt;

pub use aggregate::{ClinicalRecords, DataAggregator, Facts, PatientDirectory};
pub use orchestrator::{
    GenerationSettings, HistoryOrchestrator, HistoryReader, HistoryStore, HistoryViews, PdfEviction,
};
pub use prompt::build_history_prompt;
