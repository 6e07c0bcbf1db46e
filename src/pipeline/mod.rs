pub mod generation;
pub mod history;
pub mod rendering;

use thiserror::Error;

use crate::db::DatabaseError;
use generation::GenerationError;

/// Errors surfaced by the history pipeline (generation, reads, rendering).
///
/// `Clone` so that callers joined on one in-flight PDF render can each
/// receive the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("AI service misconfigured: {0}")]
    Configuration(String),

    #[error("AI service rate limit reached: {0}")]
    RateLimited(String),

    #[error("AI service timed out: {0}")]
    Timeout(String),

    #[error("AI service unavailable: {0}")]
    Unavailable(String),

    #[error("Document rendering failed: {0}")]
    Rendering(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl HistoryError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        HistoryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<DatabaseError> for HistoryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => HistoryError::NotFound {
                entity: entity_type,
                id,
            },
            other => HistoryError::Persistence(other.to_string()),
        }
    }
}

impl From<GenerationError> for HistoryError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Configuration(m) => HistoryError::Configuration(m),
            GenerationError::RateLimited(m) => HistoryError::RateLimited(m),
            GenerationError::Timeout(m) => HistoryError::Timeout(m),
            GenerationError::Unavailable(m) => HistoryError::Unavailable(m),
            GenerationError::Unknown(m) => HistoryError::Unavailable(m),
        }
    }
}
