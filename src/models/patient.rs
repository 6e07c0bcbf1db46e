use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AppointmentStatus;

/// Patient as exposed by the patient directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
}

impl PatientRecord {
    /// "First Last", trimmed. Used on documents and in filenames.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub doctor_name: String,
    pub specialty: Option<String>,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
}

/// Vital signs captured during a consultation. Every field is optional
/// because clinicians rarely record the full set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<u32>,
    pub respiratory_rate: Option<u32>,
    pub temperature_c: Option<f64>,
    pub oxygen_saturation: Option<u32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
}

impl VitalSigns {
    pub fn is_empty(&self) -> bool {
        self == &VitalSigns::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub consulted_at: NaiveDateTime,
    pub doctor_name: String,
    pub specialty: Option<String>,
    pub chief_complaint: String,
    pub symptoms: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub vital_signs: Option<VitalSigns>,
    pub prescriptions: Option<String>,
    pub notes: Option<String>,
}
