use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{DatabaseError, DATETIME_FORMAT};
use crate::models::enums::{HistoryFormat, HistoryType, Language};
use crate::models::{AuditFields, GeneratedHistory};

const HISTORY_COLUMNS: &str = "id, patient_id, generated_by, content, format, history_type,
     start_date, end_date, include_vital_signs, include_prescriptions, language,
     generated_at, tokens_used, notes, created_at, updated_at";

/// Insert a generated history. A single statement, so readers either see
/// the whole row or nothing.
pub fn insert_history(conn: &Connection, h: &GeneratedHistory) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO generated_histories ({HISTORY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            h.audit.id.to_string(),
            h.patient_id.to_string(),
            h.generated_by.to_string(),
            h.content,
            h.format.as_str(),
            h.history_type.as_str(),
            h.start_date.map(|d| d.to_string()),
            h.end_date.map(|d| d.to_string()),
            h.include_vital_signs as i32,
            h.include_prescriptions as i32,
            h.language.as_str(),
            h.generated_at.format(DATETIME_FORMAT).to_string(),
            h.tokens_used,
            h.notes,
            h.audit.created_at.format(DATETIME_FORMAT).to_string(),
            h.audit.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_history(conn: &Connection, id: &Uuid) -> Result<Option<GeneratedHistory>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HISTORY_COLUMNS} FROM generated_histories WHERE id = ?1"
    ))?;
    let row = stmt
        .query_row(params![id.to_string()], read_history_row)
        .optional()?;
    row.map(history_from_row).transpose()
}

/// Most recent first. Ties on `generated_at` fall back to insertion order.
pub fn list_histories_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    limit: usize,
) -> Result<Vec<GeneratedHistory>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HISTORY_COLUMNS} FROM generated_histories
         WHERE patient_id = ?1
         ORDER BY generated_at DESC, rowid DESC
         LIMIT ?2"
    ))?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), limit as i64],
        read_history_row,
    )?;
    rows.map(|r| -> Result<GeneratedHistory, DatabaseError> { history_from_row(r?) })
        .collect()
}

/// Delete a history. Cascades to its stored PDF artifact.
pub fn delete_history(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM generated_histories WHERE id = ?1",
        params![id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "GeneratedHistory".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

struct HistoryRow {
    id: String,
    patient_id: String,
    generated_by: String,
    content: String,
    format: String,
    history_type: String,
    start_date: Option<String>,
    end_date: Option<String>,
    include_vital_signs: i32,
    include_prescriptions: i32,
    language: String,
    generated_at: String,
    tokens_used: Option<u32>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_history_row(row: &rusqlite::Row) -> Result<HistoryRow, rusqlite::Error> {
    Ok(HistoryRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        generated_by: row.get(2)?,
        content: row.get(3)?,
        format: row.get(4)?,
        history_type: row.get(5)?,
        start_date: row.get(6)?,
        end_date: row.get(7)?,
        include_vital_signs: row.get(8)?,
        include_prescriptions: row.get(9)?,
        language: row.get(10)?,
        generated_at: row.get(11)?,
        tokens_used: row.get(12)?,
        notes: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn history_from_row(row: HistoryRow) -> Result<GeneratedHistory, DatabaseError> {
    Ok(GeneratedHistory {
        audit: AuditFields {
            id: parse_uuid(&row.id)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        },
        patient_id: parse_uuid(&row.patient_id)?,
        generated_by: parse_uuid(&row.generated_by)?,
        content: row.content,
        format: HistoryFormat::from_str(&row.format)?,
        history_type: HistoryType::from_str(&row.history_type)?,
        start_date: row.start_date.as_deref().map(parse_date).transpose()?,
        end_date: row.end_date.as_deref().map(parse_date).transpose()?,
        include_vital_signs: row.include_vital_signs != 0,
        include_prescriptions: row.include_prescriptions != 0,
        language: Language::from_str(&row.language)?,
        generated_at: parse_datetime(&row.generated_at)?,
        tokens_used: row.tokens_used,
        notes: row.notes,
    })
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(format!("invalid uuid {s}: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("invalid datetime {s}: {e}")))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(format!("invalid date {s}: {e}")))
}
