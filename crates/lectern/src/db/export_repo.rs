//! Export job repository.
//!
//! Export jobs are durable: status survives restarts even though the
//! in-memory task records that drive them do not.

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

/// Lifecycle of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
}

impl ExportJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportJobStatus::Pending => "pending",
            ExportJobStatus::Processing => "processing",
            ExportJobStatus::Completed => "completed",
            ExportJobStatus::Failed => "failed",
            ExportJobStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExportJobStatus::Pending),
            "processing" => Some(ExportJobStatus::Processing),
            "completed" => Some(ExportJobStatus::Completed),
            "failed" => Some(ExportJobStatus::Failed),
            "expired" => Some(ExportJobStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ExportJobRow {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub format: String,
    pub status: String,
    pub file_path: Option<String>,
    pub download_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: Option<String>,
}

impl ExportJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            user_id: row.get("user_id")?,
            format: row.get("format")?,
            status: row.get("status")?,
            file_path: row.get("file_path")?,
            download_url: row.get("download_url")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            expires_at: row.get("expires_at")?,
        })
    }

    pub fn status(&self) -> ExportJobStatus {
        ExportJobStatus::parse(&self.status).unwrap_or_else(|| {
            log::warn!(
                "Unknown export job status '{}' for job {}, treating as pending",
                self.status,
                self.id
            );
            ExportJobStatus::Pending
        })
    }

    /// True once the stored expiry timestamp is in the past. Timestamps
    /// are RFC 3339 UTC, so string comparison is chronological.
    pub fn is_past_expiry(&self, now: &str) -> bool {
        match &self.expires_at {
            Some(expires) => expires.as_str() < now,
            None => false,
        }
    }
}

pub fn insert(
    db: &Database,
    id: &str,
    session_id: &str,
    user_id: &str,
    format: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO export_jobs (id, session_id, user_id, format, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
            params![id, session_id, user_id, format, now],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ExportJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM export_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ExportJobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn mark_processing(db: &Database, id: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE export_jobs SET status = 'processing', updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
}

pub fn mark_completed(
    db: &Database,
    id: &str,
    file_path: &str,
    download_url: &str,
    expires_at: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE export_jobs SET status = 'completed', file_path = ?2, download_url = ?3,
             expires_at = ?4, error_message = NULL, updated_at = ?5 WHERE id = ?1",
            params![id, file_path, download_url, expires_at, now],
        )?;
        Ok(changed > 0)
    })
}

pub fn mark_failed(
    db: &Database,
    id: &str,
    message: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE export_jobs SET status = 'failed', error_message = ?2, updated_at = ?3
             WHERE id = ?1",
            params![id, message, now],
        )?;
        Ok(changed > 0)
    })
}

/// Completed jobs whose expiry timestamp has passed. Candidates for the
/// reaper; RFC 3339 UTC strings compare chronologically.
pub fn find_expired(db: &Database, now: &str) -> Result<Vec<ExportJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM export_jobs
             WHERE status = 'completed' AND expires_at IS NOT NULL AND expires_at < ?1",
        )?;
        let rows = stmt
            .query_map(params![now], ExportJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Marks a job expired and clears its artifact references.
pub fn mark_expired(db: &Database, id: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE export_jobs SET status = 'expired', file_path = NULL, download_url = NULL,
             updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
}
