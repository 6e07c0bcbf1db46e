use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{HistoryFormat, HistoryType, Language};

/// Identifier and bookkeeping timestamps shared by persisted entities.
/// Embedded by value in each entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    pub id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl AuditFields {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Caller-supplied knobs for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default)]
    pub history_type: HistoryType,
    #[serde(default)]
    pub format: HistoryFormat,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub include_vital_signs: bool,
    #[serde(default = "default_true")]
    pub include_prescriptions: bool,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            history_type: HistoryType::default(),
            format: HistoryFormat::default(),
            start_date: None,
            end_date: None,
            include_vital_signs: true,
            include_prescriptions: true,
            language: Language::default(),
            notes: None,
        }
    }
}

/// One generation run, persisted as an append-only record.
///
/// There is no update path: content, format and the source window never
/// change after insert. A new generation always produces a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedHistory {
    #[serde(flatten)]
    pub audit: AuditFields,
    pub patient_id: Uuid,
    pub generated_by: Uuid,
    pub content: String,
    pub format: HistoryFormat,
    pub history_type: HistoryType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub include_vital_signs: bool,
    pub include_prescriptions: bool,
    pub language: Language,
    pub generated_at: NaiveDateTime,
    pub tokens_used: Option<u32>,
    pub notes: Option<String>,
}

impl GeneratedHistory {
    pub fn id(&self) -> Uuid {
        self.audit.id
    }
}

/// Read projection carrying the patient's display name alongside the
/// record, so renderers never need their own patient lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryView {
    pub history: GeneratedHistory,
    pub patient_name: String,
}

/// Rendered PDF for one history. Lives only in the PDF cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfArtifact {
    pub history_id: Uuid,
    pub filename: String,
    pub bytes: Vec<u8>,
}
