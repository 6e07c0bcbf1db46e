use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{DatabaseError, DATETIME_FORMAT};
use crate::models::PdfArtifact;

pub fn get_pdf_artifact(conn: &Connection, history_id: &Uuid) -> Result<Option<PdfArtifact>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT filename, bytes FROM pdf_artifacts WHERE history_id = ?1",
            params![history_id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)),
        )
        .optional()?;
    Ok(row.map(|(filename, bytes)| PdfArtifact {
        history_id: *history_id,
        filename,
        bytes,
    }))
}

/// Insert or replace the artifact for its history.
pub fn upsert_pdf_artifact(conn: &Connection, artifact: &PdfArtifact) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO pdf_artifacts (history_id, filename, bytes, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            artifact.history_id.to_string(),
            artifact.filename,
            artifact.bytes,
            Utc::now().naive_utc().format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

/// Idempotent: removing a missing artifact is not an error.
pub fn delete_pdf_artifact(conn: &Connection, history_id: &Uuid) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM pdf_artifacts WHERE history_id = ?1",
        params![history_id.to_string()],
    )?;
    Ok(affected > 0)
}
