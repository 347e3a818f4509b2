//! Session repository — CRUD operations for the `sessions` table.

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

/// Processing lifecycle of a lecture session.
///
/// Monotone within one attempt: pending → processing → completed | failed.
/// A reprocessing run re-enters `processing` from any prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "processing" => Some(ProcessingStatus::Processing),
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw session row from the database.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub title: Option<String>,
    pub transcript: Option<String>,
    pub audio_duration_seconds: Option<i64>,
    pub language: Option<String>,
    pub processing_status: String,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            transcript: row.get("transcript")?,
            audio_duration_seconds: row.get("audio_duration_seconds")?,
            language: row.get("language")?,
            processing_status: row.get("processing_status")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn status(&self) -> ProcessingStatus {
        ProcessingStatus::parse(&self.processing_status).unwrap_or_else(|| {
            log::warn!(
                "Unknown session status '{}' for session {}, treating as pending",
                self.processing_status,
                self.id
            );
            ProcessingStatus::Pending
        })
    }
}

/// Inserts a new session in `pending` state.
pub fn insert(
    db: &Database,
    id: &str,
    title: Option<&str>,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sessions (id, title, processing_status, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?3)",
            params![id, title, now],
        )?;
        Ok(())
    })
}

/// Finds a session by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<SessionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM sessions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], SessionRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Updates the processing status (and failure reason) of a session.
/// Returns false if no session with that ID exists.
pub fn set_status(
    db: &Database,
    id: &str,
    status: ProcessingStatus,
    error: Option<&str>,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE sessions SET processing_status = ?2, error = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status.as_str(), error, updated_at],
        )?;
        Ok(changed > 0)
    })
}

/// Persists the transcription result onto the session. Written as soon as
/// transcription finishes so a later generation failure still leaves a
/// usable transcript behind.
pub fn update_transcript(
    db: &Database,
    id: &str,
    transcript: &str,
    duration_seconds: i64,
    language: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE sessions SET transcript = ?2, audio_duration_seconds = ?3,
             language = ?4, updated_at = ?5 WHERE id = ?1",
            params![id, transcript, duration_seconds, language, updated_at],
        )?;
        Ok(changed > 0)
    })
}
