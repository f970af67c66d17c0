//! Database layer for the clinic queue.

mod schema;
mod stats;
mod tokens;
mod users;

pub use schema::*;
#[allow(unused_imports)]
pub use stats::*;
#[allow(unused_imports)]
pub use tokens::*;
#[allow(unused_imports)]
pub use users::*;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl DbError {
    /// Transient storage faults the caller may retry.
    pub fn is_unavailable(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
            ),
            _ => false,
        }
    }

    pub(crate) fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
        )
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// How long a writer waits on a locked database before failing with `BUSY`.
    pub fn set_busy_timeout(&self, timeout: Duration) -> DbResult<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    ///
    /// Statements issued through `self` run inside it until it is committed
    /// or dropped (rolled back).
    pub fn transaction(&self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }
}

/// Fixed-width UTC timestamp so that text order equals time order.
pub(crate) fn to_sql_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_sql_timestamp(s: &str) -> DbResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        // Check that tables exist
        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"tokens".to_string()));
        assert!(tables.contains(&"daily_stats".to_string()));
    }

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1500);
        let (a, b) = (to_sql_timestamp(&early), to_sql_timestamp(&late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(from_sql_timestamp(&b).unwrap(), late);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        // Applying the schema again must not fail or duplicate anything
        assert!(db.initialize().is_ok());
    }
}
