use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::{AppointmentRecord, ConsultationRecord, GeneratedHistory, PatientRecord, PdfArtifact};
use crate::pdf_cache::ArtifactStore;
use crate::pipeline::history::{ClinicalRecords, HistoryStore, PatientDirectory};
use crate::pipeline::HistoryError;

/// SQLite-backed implementation of every storage seam the pipeline uses.
///
/// One connection behind a mutex. Each trait call is a single statement
/// (or a single read), so a lock is held only for the duration of that
/// statement and never across an await.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (creating and migrating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(open_memory_database()?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    pub fn insert_patient(&self, patient: &PatientRecord) -> Result<(), DatabaseError> {
        repository::insert_patient(&*self.conn()?, patient)
    }

    pub fn insert_appointment(&self, appointment: &AppointmentRecord) -> Result<(), DatabaseError> {
        repository::insert_appointment(&*self.conn()?, appointment)
    }

    pub fn insert_consultation(&self, consultation: &ConsultationRecord) -> Result<(), DatabaseError> {
        repository::insert_consultation(&*self.conn()?, consultation)
    }
}

impl PatientDirectory for SqliteStore {
    fn find_patient(&self, id: &Uuid) -> Result<Option<PatientRecord>, HistoryError> {
        Ok(repository::get_patient(&*self.conn()?, id)?)
    }
}

impl ClinicalRecords for SqliteStore {
    fn appointments_between(
        &self,
        patient_id: &Uuid,
        from: Option<NaiveDateTime>,
        until: Option<NaiveDateTime>,
    ) -> Result<Vec<AppointmentRecord>, HistoryError> {
        Ok(repository::get_appointments_in_range(&*self.conn()?, patient_id, from, until)?)
    }

    fn consultations_between(
        &self,
        patient_id: &Uuid,
        from: Option<NaiveDateTime>,
        until: Option<NaiveDateTime>,
    ) -> Result<Vec<ConsultationRecord>, HistoryError> {
        Ok(repository::get_consultations_in_range(&*self.conn()?, patient_id, from, until)?)
    }
}

impl HistoryStore for SqliteStore {
    fn insert_history(&self, history: &GeneratedHistory) -> Result<(), HistoryError> {
        Ok(repository::insert_history(&*self.conn()?, history)?)
    }

    fn find_history(&self, id: &Uuid) -> Result<Option<GeneratedHistory>, HistoryError> {
        Ok(repository::get_history(&*self.conn()?, id)?)
    }

    fn list_for_patient(&self, patient_id: &Uuid, limit: usize) -> Result<Vec<GeneratedHistory>, HistoryError> {
        Ok(repository::list_histories_for_patient(&*self.conn()?, patient_id, limit)?)
    }

    fn delete_history(&self, id: &Uuid) -> Result<(), HistoryError> {
        Ok(repository::delete_history(&*self.conn()?, id)?)
    }
}

impl ArtifactStore for SqliteStore {
    fn load_artifact(&self, history_id: &Uuid) -> Result<Option<PdfArtifact>, HistoryError> {
        Ok(repository::get_pdf_artifact(&*self.conn()?, history_id)?)
    }

    fn store_artifact(&self, artifact: &PdfArtifact) -> Result<(), HistoryError> {
        Ok(repository::upsert_pdf_artifact(&*self.conn()?, artifact)?)
    }

    fn remove_artifact(&self, history_id: &Uuid) -> Result<bool, HistoryError> {
        Ok(repository::delete_pdf_artifact(&*self.conn()?, history_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{HistoryFormat, HistoryType, Language};
    use crate::models::AuditFields;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn patient() -> PatientRecord {
        PatientRecord {
            id: Uuid::new_v4(),
            first_name: "Ana".into(),
            last_name: "Pérez".into(),
            birth_date: None,
            gender: None,
            blood_type: None,
            allergies: None,
            chronic_conditions: None,
        }
    }

    fn history(patient_id: Uuid) -> GeneratedHistory {
        let now = at("2025-12-13 14:30:00");
        GeneratedHistory {
            audit: AuditFields::new(now),
            patient_id,
            generated_by: Uuid::new_v4(),
            content: "# Historia".into(),
            format: HistoryFormat::Markdown,
            history_type: HistoryType::Complete,
            start_date: None,
            end_date: None,
            include_vital_signs: true,
            include_prescriptions: true,
            language: Language::Es,
            generated_at: now,
            tokens_used: Some(42),
            notes: None,
        }
    }

    #[test]
    fn history_store_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let p = patient();
        store.insert_patient(&p).unwrap();
        let h = history(p.id);

        store.insert_history(&h).unwrap();
        assert_eq!(store.find_history(&h.id()).unwrap(), Some(h.clone()));
        assert_eq!(store.list_for_patient(&p.id, 10).unwrap().len(), 1);

        store.delete_history(&h.id()).unwrap();
        assert!(store.find_history(&h.id()).unwrap().is_none());
    }

    #[test]
    fn deleting_missing_history_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.delete_history(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, HistoryError::NotFound { .. }));
    }

    #[test]
    fn artifacts_cascade_with_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        let p = patient();
        store.insert_patient(&p).unwrap();
        let h = history(p.id);
        store.insert_history(&h).unwrap();

        let artifact = PdfArtifact {
            history_id: h.id(),
            filename: "Historial_Medico_Ana_Perez_20251213.pdf".into(),
            bytes: b"%PDF-1.3".to_vec(),
        };
        store.store_artifact(&artifact).unwrap();
        assert_eq!(store.load_artifact(&h.id()).unwrap(), Some(artifact));

        store.delete_history(&h.id()).unwrap();
        assert!(store.load_artifact(&h.id()).unwrap().is_none());
        assert!(!store.remove_artifact(&h.id()).unwrap());
    }

    #[test]
    fn patient_directory_reports_absence() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.find_patient(&Uuid::new_v4()).unwrap().is_none());
    }
}
