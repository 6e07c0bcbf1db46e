use std::sync::Arc;

use chrono::SubsecRound;
use uuid::Uuid;

use super::aggregate::{ClinicalRecords, DataAggregator, PatientDirectory};
use super::prompt::build_history_prompt;
use crate::config::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::models::{AuditFields, GeneratedHistory, GenerationOptions, HistoryView};
use crate::pipeline::generation::{
    clean_generated_text, generate_with_retry, GenerationClient, RetryPolicy, SamplingParams,
};
use crate::pipeline::HistoryError;

/// Persistence for generated histories. Each write is one atomic
/// statement: a history is either fully visible or absent.
pub trait HistoryStore: Send + Sync {
    fn insert_history(&self, history: &GeneratedHistory) -> Result<(), HistoryError>;
    fn find_history(&self, id: &Uuid) -> Result<Option<GeneratedHistory>, HistoryError>;
    /// Most recent first, at most `limit` rows.
    fn list_for_patient(&self, patient_id: &Uuid, limit: usize) -> Result<Vec<GeneratedHistory>, HistoryError>;
    /// `NotFound` when no such history exists.
    fn delete_history(&self, id: &Uuid) -> Result<(), HistoryError>;
}

/// Read path used by renderers: a history plus the patient's display name.
pub trait HistoryViews: Send + Sync {
    fn view(&self, history_id: &Uuid) -> Result<HistoryView, HistoryError>;
}

/// Invalidation hook for whatever caches rendered documents.
pub trait PdfEviction: Send + Sync {
    fn evict(&self, history_id: &Uuid) -> Result<(), HistoryError>;
}

/// Resolves `HistoryView`s from the history store and patient directory.
#[derive(Clone)]
pub struct HistoryReader {
    histories: Arc<dyn HistoryStore>,
    patients: Arc<dyn PatientDirectory>,
}

impl HistoryReader {
    pub fn new(histories: Arc<dyn HistoryStore>, patients: Arc<dyn PatientDirectory>) -> Self {
        Self { histories, patients }
    }
}

impl HistoryViews for HistoryReader {
    fn view(&self, history_id: &Uuid) -> Result<HistoryView, HistoryError> {
        let history = self
            .histories
            .find_history(history_id)?
            .ok_or_else(|| HistoryError::not_found("GeneratedHistory", history_id))?;
        let patient = self
            .patients
            .find_patient(&history.patient_id)?
            .ok_or_else(|| HistoryError::not_found("Patient", history.patient_id))?;

        Ok(HistoryView {
            patient_name: patient.display_name(),
            history,
        })
    }
}

/// Generation knobs that come from deployment configuration rather than
/// from the request.
#[derive(Debug, Clone, Default)]
pub struct GenerationSettings {
    pub sampling: SamplingParams,
    pub retry: RetryPolicy,
}

/// Entry point for creating, listing, reading and deleting histories.
pub struct HistoryOrchestrator {
    aggregator: DataAggregator,
    reader: HistoryReader,
    histories: Arc<dyn HistoryStore>,
    client: Arc<dyn GenerationClient>,
    eviction: Arc<dyn PdfEviction>,
    settings: GenerationSettings,
}

impl HistoryOrchestrator {
    pub fn new(
        patients: Arc<dyn PatientDirectory>,
        records: Arc<dyn ClinicalRecords>,
        histories: Arc<dyn HistoryStore>,
        client: Arc<dyn GenerationClient>,
        eviction: Arc<dyn PdfEviction>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            aggregator: DataAggregator::new(patients.clone(), records),
            reader: HistoryReader::new(histories.clone(), patients),
            histories,
            client,
            eviction,
            settings,
        }
    }

    /// Aggregate, prompt, generate (with retry) and persist one history.
    ///
    /// Nothing is written unless generation succeeds, and the write is a
    /// single insert.
    pub async fn generate(
        &self,
        patient_id: Uuid,
        options: GenerationOptions,
        requested_by: Uuid,
    ) -> Result<GeneratedHistory, HistoryError> {
        validate_options(&options)?;

        let facts = self.aggregator.aggregate(
            &patient_id,
            options.start_date,
            options.end_date,
            options.include_vital_signs,
            options.include_prescriptions,
        )?;

        let prompt = build_history_prompt(&facts, &options);
        tracing::debug!(
            patient_id = %patient_id,
            history_type = %options.history_type,
            prompt_chars = prompt.chars().count(),
            "Built history prompt"
        );

        let generation = generate_with_retry(
            self.client.as_ref(),
            &prompt,
            &self.settings.sampling,
            &self.settings.retry,
        )
        .await
        .map_err(|e| {
            tracing::warn!(patient_id = %patient_id, error = %e, "History generation failed");
            HistoryError::from(e)
        })?;

        // Stored with second precision; keep the returned record identical.
        let now = chrono::Local::now().naive_local().trunc_subsecs(0);
        let history = GeneratedHistory {
            audit: AuditFields::new(now),
            patient_id,
            generated_by: requested_by,
            content: clean_generated_text(&generation.text),
            format: options.format,
            history_type: options.history_type,
            start_date: options.start_date,
            end_date: options.end_date,
            include_vital_signs: options.include_vital_signs,
            include_prescriptions: options.include_prescriptions,
            language: options.language,
            generated_at: now,
            tokens_used: Some(generation.usage.total_tokens),
            notes: options.notes,
        };

        self.histories.insert_history(&history).map_err(|e| {
            tracing::error!(patient_id = %patient_id, error = %e, "Failed to save generated history");
            e
        })?;

        tracing::info!(
            history_id = %history.id(),
            patient_id = %patient_id,
            history_type = %history.history_type,
            tokens = generation.usage.total_tokens,
            "Medical history generated"
        );

        Ok(history)
    }

    /// Histories for a patient, most recent first. `limit` defaults to 10
    /// and is capped at 100.
    pub fn list(&self, patient_id: &Uuid, limit: Option<usize>) -> Result<Vec<GeneratedHistory>, HistoryError> {
        let limit = effective_limit(limit)?;
        self.histories.list_for_patient(patient_id, limit)
    }

    pub fn get_by_id(&self, history_id: &Uuid) -> Result<GeneratedHistory, HistoryError> {
        self.histories
            .find_history(history_id)?
            .ok_or_else(|| HistoryError::not_found("GeneratedHistory", history_id))
    }

    pub fn get_view(&self, history_id: &Uuid) -> Result<HistoryView, HistoryError> {
        self.reader.view(history_id)
    }

    /// Remove a history and evict its rendered PDF. Eviction failures are
    /// logged; the history is gone either way.
    pub fn delete(&self, history_id: &Uuid) -> Result<(), HistoryError> {
        self.histories.delete_history(history_id)?;
        if let Err(e) = self.eviction.evict(history_id) {
            tracing::warn!(history_id = %history_id, error = %e, "PDF eviction after delete failed");
        }
        tracing::info!(history_id = %history_id, "Medical history deleted");
        Ok(())
    }
}

fn validate_options(options: &GenerationOptions) -> Result<(), HistoryError> {
    if let (Some(start), Some(end)) = (options.start_date, options.end_date) {
        if start > end {
            return Err(HistoryError::InvalidRequest(format!(
                "start_date {start} is after end_date {end}"
            )));
        }
    }
    Ok(())
}

fn effective_limit(limit: Option<usize>) -> Result<usize, HistoryError> {
    match limit {
        None => Ok(DEFAULT_HISTORY_LIMIT),
        Some(0) => Err(HistoryError::InvalidRequest("limit must be at least 1".into())),
        Some(n) => Ok(n.min(MAX_HISTORY_LIMIT)),
    }
}
