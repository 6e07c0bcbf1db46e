use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::models::{AppointmentRecord, ConsultationRecord, PatientRecord};
use crate::pipeline::HistoryError;

/// Patient lookup owned by the patient-management side of the system.
pub trait PatientDirectory: Send + Sync {
    fn find_patient(&self, id: &Uuid) -> Result<Option<PatientRecord>, HistoryError>;
}

/// Range queries over a patient's appointments and consultations.
/// `from` is inclusive, `until` exclusive; `None` leaves that side open.
pub trait ClinicalRecords: Send + Sync {
    fn appointments_between(
        &self,
        patient_id: &Uuid,
        from: Option<NaiveDateTime>,
        until: Option<NaiveDateTime>,
    ) -> Result<Vec<AppointmentRecord>, HistoryError>;

    fn consultations_between(
        &self,
        patient_id: &Uuid,
        from: Option<NaiveDateTime>,
        until: Option<NaiveDateTime>,
    ) -> Result<Vec<ConsultationRecord>, HistoryError>;
}

/// Everything the prompt needs about one patient, already filtered to the
/// requested window and inclusion flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Facts {
    pub patient: PatientRecord,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub appointments: Vec<AppointmentRecord>,
    pub consultations: Vec<ConsultationRecord>,
}

/// Collects the facts for one generation run. Read-only.
pub struct DataAggregator {
    patients: Arc<dyn PatientDirectory>,
    records: Arc<dyn ClinicalRecords>,
}

impl DataAggregator {
    pub fn new(patients: Arc<dyn PatientDirectory>, records: Arc<dyn ClinicalRecords>) -> Self {
        Self { patients, records }
    }

    /// Gather demographics plus the appointments and consultations whose
    /// date falls within `[start_date, end_date]` (whole days).
    ///
    /// Vital signs and prescriptions are removed from the consultations
    /// when their flag is off, so nothing downstream can leak them.
    pub fn aggregate(
        &self,
        patient_id: &Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        include_vital_signs: bool,
        include_prescriptions: bool,
    ) -> Result<Facts, HistoryError> {
        let patient = self
            .patients
            .find_patient(patient_id)?
            .ok_or_else(|| HistoryError::not_found("Patient", patient_id))?;

        let (from, until) = day_window(start_date, end_date);

        let appointments = self.records.appointments_between(patient_id, from, until)?;
        let mut consultations = self.records.consultations_between(patient_id, from, until)?;

        for c in &mut consultations {
            if !include_vital_signs {
                c.vital_signs = None;
            }
            if !include_prescriptions {
                c.prescriptions = None;
            }
        }

        tracing::debug!(
            patient_id = %patient_id,
            appointments = appointments.len(),
            consultations = consultations.len(),
            "Aggregated clinical facts"
        );

        Ok(Facts {
            patient,
            start_date,
            end_date,
            appointments,
            consultations,
        })
    }
}

/// Half-open datetime bounds covering whole days `[start, end]`.
fn day_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    let from = start.map(|d| d.and_time(NaiveTime::MIN));
    let until = end.and_then(|d| d.succ_opt()).map(|d| d.and_time(NaiveTime::MIN));
    (from, until)
}
