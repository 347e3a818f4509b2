//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// Returns true when the error indicates the live schema is missing an
    /// expected column or table. This is the one condition the store heals
    /// automatically (re-apply migrations, retry the write once).
    pub fn is_schema_drift(&self) -> bool {
        match self {
            DatabaseError::Sqlite(e) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("no such column") || msg.contains("no such table")
            }
            _ => false,
        }
    }
}
