//! Read access to the collaborator tables (patients, appointments,
//! consultations). Inserts exist for seeding and tests only; the owning
//! services write these tables in production.

use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::history::{parse_date, parse_datetime, parse_uuid};
use crate::db::{DatabaseError, DATETIME_FORMAT};
use crate::models::enums::AppointmentStatus;
use crate::models::{AppointmentRecord, ConsultationRecord, PatientRecord, VitalSigns};

// ═══════════════════════════════════════════
// Patients
// ═══════════════════════════════════════════

pub fn insert_patient(conn: &Connection, p: &PatientRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, first_name, last_name, birth_date, gender, blood_type,
         allergies, chronic_conditions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            p.id.to_string(),
            p.first_name,
            p.last_name,
            p.birth_date.map(|d| d.to_string()),
            p.gender,
            p.blood_type,
            p.allergies,
            p.chronic_conditions,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<PatientRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, first_name, last_name, birth_date, gender, blood_type, allergies,
             chronic_conditions
             FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            },
        )
        .optional()?;

    row.map(
        |(id, first_name, last_name, birth_date, gender, blood_type, allergies, chronic)|
         -> Result<PatientRecord, DatabaseError> {
            Ok(PatientRecord {
                id: parse_uuid(&id)?,
                first_name,
                last_name,
                birth_date: birth_date.as_deref().map(parse_date).transpose()?,
                gender,
                blood_type,
                allergies,
                chronic_conditions: chronic,
            })
        },
    )
    .transpose()
}

// ═══════════════════════════════════════════
// Appointments
// ═══════════════════════════════════════════

pub fn insert_appointment(conn: &Connection, a: &AppointmentRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, scheduled_at, doctor_name, specialty, reason, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            a.id.to_string(),
            a.patient_id.to_string(),
            a.scheduled_at.format(DATETIME_FORMAT).to_string(),
            a.doctor_name,
            a.specialty,
            a.reason,
            a.status.as_str(),
        ],
    )?;
    Ok(())
}

/// Appointments for a patient with `from <= scheduled_at < until`, ascending.
/// `None` bounds are open.
pub fn get_appointments_in_range(
    conn: &Connection,
    patient_id: &Uuid,
    from: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
) -> Result<Vec<AppointmentRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, scheduled_at, doctor_name, specialty, reason, status
         FROM appointments
         WHERE patient_id = ?1
           AND (?2 IS NULL OR scheduled_at >= ?2)
           AND (?3 IS NULL OR scheduled_at < ?3)
         ORDER BY scheduled_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), fmt_bound(from), fmt_bound(until)],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        },
    )?;

    rows.map(|r| -> Result<AppointmentRecord, DatabaseError> {
        let (id, patient_id, scheduled_at, doctor_name, specialty, reason, status) = r?;
        Ok(AppointmentRecord {
            id: parse_uuid(&id)?,
            patient_id: parse_uuid(&patient_id)?,
            scheduled_at: parse_datetime(&scheduled_at)?,
            doctor_name,
            specialty,
            reason,
            status: AppointmentStatus::from_str(&status)?,
        })
    })
    .collect()
}

// ═══════════════════════════════════════════
// Consultations
// ═══════════════════════════════════════════

pub fn insert_consultation(conn: &Connection, c: &ConsultationRecord) -> Result<(), DatabaseError> {
    let vitals = c
        .vital_signs
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO consultations (id, patient_id, appointment_id, consulted_at, doctor_name,
         specialty, chief_complaint, symptoms, diagnosis, treatment_plan, vital_signs,
         prescriptions, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            c.id.to_string(),
            c.patient_id.to_string(),
            c.appointment_id.map(|id| id.to_string()),
            c.consulted_at.format(DATETIME_FORMAT).to_string(),
            c.doctor_name,
            c.specialty,
            c.chief_complaint,
            c.symptoms,
            c.diagnosis,
            c.treatment_plan,
            vitals,
            c.prescriptions,
            c.notes,
        ],
    )?;
    Ok(())
}

struct ConsultationRow {
    id: String,
    patient_id: String,
    appointment_id: Option<String>,
    consulted_at: String,
    doctor_name: String,
    specialty: Option<String>,
    chief_complaint: String,
    symptoms: Option<String>,
    diagnosis: Option<String>,
    treatment_plan: Option<String>,
    vital_signs: Option<String>,
    prescriptions: Option<String>,
    notes: Option<String>,
}

/// Consultations for a patient with `from <= consulted_at < until`, ascending.
pub fn get_consultations_in_range(
    conn: &Connection,
    patient_id: &Uuid,
    from: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
) -> Result<Vec<ConsultationRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, appointment_id, consulted_at, doctor_name, specialty,
         chief_complaint, symptoms, diagnosis, treatment_plan, vital_signs, prescriptions, notes
         FROM consultations
         WHERE patient_id = ?1
           AND (?2 IS NULL OR consulted_at >= ?2)
           AND (?3 IS NULL OR consulted_at < ?3)
         ORDER BY consulted_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), fmt_bound(from), fmt_bound(until)],
        |row| {
            Ok(ConsultationRow {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                appointment_id: row.get(2)?,
                consulted_at: row.get(3)?,
                doctor_name: row.get(4)?,
                specialty: row.get(5)?,
                chief_complaint: row.get(6)?,
                symptoms: row.get(7)?,
                diagnosis: row.get(8)?,
                treatment_plan: row.get(9)?,
                vital_signs: row.get(10)?,
                prescriptions: row.get(11)?,
                notes: row.get(12)?,
            })
        },
    )?;

    rows.map(|r| -> Result<ConsultationRecord, DatabaseError> { consultation_from_row(r?) })
        .collect()
}

fn consultation_from_row(row: ConsultationRow) -> Result<ConsultationRecord, DatabaseError> {
    let vital_signs = match row.vital_signs.as_deref() {
        Some(json) if !json.trim().is_empty() => Some(serde_json::from_str::<VitalSigns>(json)?),
        _ => None,
    };
    Ok(ConsultationRecord {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        appointment_id: row.appointment_id.as_deref().map(parse_uuid).transpose()?,
        consulted_at: parse_datetime(&row.consulted_at)?,
        doctor_name: row.doctor_name,
        specialty: row.specialty,
        chief_complaint: row.chief_complaint,
        symptoms: row.symptoms,
        diagnosis: row.diagnosis,
        treatment_plan: row.treatment_plan,
        vital_signs,
        prescriptions: row.prescriptions,
        notes: row.notes,
    })
}

fn fmt_bound(bound: Option<NaiveDateTime>) -> Option<String> {
    bound.map(|b| b.format(DATETIME_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::NaiveDate;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
    }

    fn seed_patient(conn: &Connection) -> PatientRecord {
        let p = PatientRecord {
            id: Uuid::new_v4(),
            first_name: "José".into(),
            last_name: "Núñez".into(),
            birth_date: NaiveDate::from_ymd_opt(1970, 3, 15),
            gender: Some("M".into()),
            blood_type: Some("O+".into()),
            allergies: Some("Penicilina".into()),
            chronic_conditions: None,
        };
        insert_patient(conn, &p).unwrap();
        p
    }

    fn consultation(patient_id: Uuid, when: &str) -> ConsultationRecord {
        ConsultationRecord {
            id: Uuid::new_v4(),
            patient_id,
            appointment_id: None,
            consulted_at: at(when),
            doctor_name: "Dra. Pérez".into(),
            specialty: Some("Cardiología".into()),
            chief_complaint: "Dolor torácico".into(),
            symptoms: None,
            diagnosis: Some("Hipertensión arterial".into()),
            treatment_plan: Some("Losartán 50 mg".into()),
            vital_signs: Some(VitalSigns {
                blood_pressure: Some("150/95".into()),
                heart_rate: Some(88),
                ..Default::default()
            }),
            prescriptions: Some("Losartán 50 mg cada 24 h".into()),
            notes: None,
        }
    }

    #[test]
    fn patient_round_trip() {
        let conn = open_memory_database().unwrap();
        let p = seed_patient(&conn);
        assert_eq!(get_patient(&conn, &p.id).unwrap(), Some(p));
        assert_eq!(get_patient(&conn, &Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn consultations_filtered_by_half_open_range() {
        let conn = open_memory_database().unwrap();
        let p = seed_patient(&conn);
        for when in ["2025-01-10 09:00:00", "2025-02-01 00:00:00", "2025-03-05 16:30:00"] {
            insert_consultation(&conn, &consultation(p.id, when)).unwrap();
        }

        let all = get_consultations_in_range(&conn, &p.id, None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].consulted_at <= w[1].consulted_at));

        let feb = get_consultations_in_range(
            &conn,
            &p.id,
            Some(at("2025-02-01 00:00:00")),
            Some(at("2025-03-01 00:00:00")),
        )
        .unwrap();
        assert_eq!(feb.len(), 1);
        assert_eq!(feb[0].vital_signs.as_ref().unwrap().heart_rate, Some(88));
    }

    #[test]
    fn appointments_scoped_to_patient() {
        let conn = open_memory_database().unwrap();
        let p = seed_patient(&conn);
        let other = seed_patient(&conn);
        for (pid, when) in [(p.id, "2025-04-01 10:00:00"), (other.id, "2025-04-02 10:00:00")] {
            insert_appointment(
                &conn,
                &AppointmentRecord {
                    id: Uuid::new_v4(),
                    patient_id: pid,
                    scheduled_at: at(when),
                    doctor_name: "Dr. Gómez".into(),
                    specialty: None,
                    reason: Some("Control".into()),
                    status: AppointmentStatus::Completed,
                },
            )
            .unwrap();
        }
        let mine = get_appointments_in_range(&conn, &p.id, None, None).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, AppointmentStatus::Completed);
    }
}
