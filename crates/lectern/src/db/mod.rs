//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`, so each write
//! holds the lock only for its own duration — worker threads never pin the
//! connection across a transcription or generation call.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod error;
pub mod export_repo;
pub mod migrations;
pub mod session_repo;
pub mod slide_repo;

pub use error::DatabaseError;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). All access is serialized through
/// a `Mutex`, which is fine for SQLite (which serializes writes anyway).
/// WAL mode is enabled for concurrent read performance.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a single transaction, committing on success.
    /// Used where a multi-statement write must be atomic to readers
    /// (the delete-then-insert slide replace).
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.unchecked_transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Re-applies the migration set to repair a drifted schema.
    pub fn heal_schema(&self) -> Result<(), DatabaseError> {
        self.with_conn(migrations::heal)
    }
}

/// Runs `op`, and if it fails with a schema-drift error (missing column or
/// table), re-applies the expected schema and retries exactly once. Any
/// second failure propagates to the caller. This is the only built-in
/// retry in the storage layer.
pub fn with_schema_heal<T, F>(db: &Database, op: F) -> Result<T, DatabaseError>
where
    F: Fn(&Database) -> Result<T, DatabaseError>,
{
    match op(db) {
        Err(e) if e.is_schema_drift() => {
            log::warn!("Schema drift detected ({}), re-applying migrations and retrying", e);
            db.heal_schema()?;
            op(db)
        }
        other => other,
    }
}

/// Returns the canonical database path: `~/.lectern/data/lectern.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".lectern").join("data").join("lectern.db"))
}

/// Formats a UTC timestamp the way every table stores them.
pub fn format_timestamp(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339()
}

/// Current UTC timestamp in storage format.
pub fn now_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            Ok(())
        })
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.ends_with("lectern.db"));
        assert!(path.to_string_lossy().contains(".lectern"));
    }

    #[test]
    fn test_database_is_clone() {
        let db = Database::open_in_memory().unwrap();
        let db2 = db.clone();
        // Both should access the same underlying connection.
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, created_at, updated_at) VALUES ('t1', '2026-01-01', '2026-01-01')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        db2.with_conn(|conn| {
            let count: u32 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_with_tx_commits() {
        let db = Database::open_in_memory().unwrap();
        db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO sessions (id, created_at, updated_at) VALUES ('tx1', '2026-01-01', '2026-01-01')",
                [],
            )?;
            tx.execute(
                "INSERT INTO sessions (id, created_at, updated_at) VALUES ('tx2', '2026-01-01', '2026-01-01')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        db.with_conn(|conn| {
            let count: u32 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
            assert_eq!(count, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_with_tx_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), DatabaseError> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO sessions (id, created_at, updated_at) VALUES ('rb1', '2026-01-01', '2026-01-01')",
                [],
            )?;
            // Duplicate primary key forces an error after the first insert.
            tx.execute(
                "INSERT INTO sessions (id, created_at, updated_at) VALUES ('rb1', '2026-01-01', '2026-01-01')",
            [],
            )?;
            Ok(())
        });
        assert!(result.is_err());

        db.with_conn(|conn| {
            let count: u32 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_with_schema_heal_retries_once() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, created_at, updated_at) VALUES ('h1', '2026-01-01', '2026-01-01')",
                [],
            )?;
            // Drift: drop a migration-added column out from under the repos.
            conn.execute_batch("ALTER TABLE sessions DROP COLUMN language;")?;
            Ok(())
        })
        .unwrap();

        let result = with_schema_heal(&db, |db| {
            db.with_conn(|conn| {
                conn.execute(
                    "UPDATE sessions SET language = 'en' WHERE id = 'h1'",
                    [],
                )?;
                Ok(())
            })
        });
        assert!(result.is_ok());

        db.with_conn(|conn| {
            let lang: Option<String> = conn.query_row(
                "SELECT language FROM sessions WHERE id = 'h1'",
                [],
                |r| r.get(0),
            )?;
            assert_eq!(lang.as_deref(), Some("en"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_with_schema_heal_passes_through_other_errors() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), DatabaseError> =
            with_schema_heal(&db, |_| Err(DatabaseError::LockPoisoned));
        assert!(matches!(result, Err(DatabaseError::LockPoisoned)));
    }
}
