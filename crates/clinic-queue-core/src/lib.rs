//! Clinic Queue Core Library
//!
//! Patient-flow tracking for a walk-in clinic: patients receive sequential
//! tokens, doctors work through a live FIFO queue, and every finished visit is
//! rolled up into per-day statistics.
//!
//! # Architecture
//!
//! ```text
//!   Patient kiosk                         Doctor dashboard
//!        │                                  │         │
//!     issue()                          call_next()  mark_done() / mark_skipped()
//!        │                                  │         │
//!        ▼                                  ▼         ▼
//!   ┌─────────────────────── QueueManager (state machine) ───────────────────┐
//!   │      waiting ──▶ serving ──▶ done                                      │
//!   │         └───────────┴──────▶ skipped                                   │
//!   └───────────────┬────────────────────────────────────┬──────────────────┘
//!                   │ conditional UPDATEs                │ terminal transitions
//!                   ▼                                    ▼
//!            [tokens table] ◀── QueueView        StatsAggregator ──▶ [daily_stats]
//!                              (pure queries)
//! ```
//!
//! # Core Principle
//!
//! **The token store is the only queue state.** Queues are queries, never
//! in-memory structures; concurrent callers are serialized by single-statement
//! compare-and-swap updates in SQLite.
//!
//! # Modules
//!
//! - [`db`]: SQLite persistence for users, tokens and daily statistics
//! - [`models`]: Domain types (Token, TokenStatus, User, DailyStatistic, etc.)
//! - [`queue`]: Lifecycle manager and queue projections
//! - [`stats`]: Daily statistics aggregator
//! - [`config`], [`logging`], [`clock`]: runtime plumbing

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod queue;
pub mod stats;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, QueueConfig};
pub use db::Database;
pub use models::{DailyStatistic, Outcome, QueueEntry, Role, Token, TokenStatus, User};
pub use queue::{QueueError, QueueManager, QueueView};
pub use stats::StatsAggregator;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use chrono::NaiveDate;
use db::DbError;
use std::sync::{Arc, Mutex};
use tracing::info;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicQueueError {
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Server busy: {0}")]
    ServerBusy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<QueueError> for ClinicQueueError {
    fn from(e: QueueError) -> Self {
        let message = e.to_string();
        match e {
            QueueError::InvalidReference(_) => ClinicQueueError::InvalidReference(message),
            QueueError::InvalidTransition { .. } => ClinicQueueError::InvalidTransition(message),
            QueueError::ServerBusy { .. } => ClinicQueueError::ServerBusy(message),
            QueueError::NotFound(_) => ClinicQueueError::NotFound(message),
            QueueError::StorageUnavailable(_) => ClinicQueueError::StorageUnavailable(message),
            QueueError::Storage(_) => ClinicQueueError::DatabaseError(message),
        }
    }
}

impl From<DbError> for ClinicQueueError {
    fn from(e: DbError) -> Self {
        QueueError::from(e).into()
    }
}

impl From<ConfigError> for ClinicQueueError {
    fn from(e: ConfigError) -> Self {
        ClinicQueueError::InvalidInput(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicQueueError {
    fn from(e: serde_json::Error) -> Self {
        ClinicQueueError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicQueueError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicQueueError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicQueueCore>, ClinicQueueError> {
    let config = QueueConfig::builder().database_path(path).build();
    ClinicQueueCore::with_config(&config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicQueueCore>, ClinicQueueError> {
    let db = Database::open_in_memory()?;
    Ok(ClinicQueueCore::from_parts(
        db,
        Arc::new(SystemClock),
        QueueConfig::default().token_prefix,
    ))
}

/// Open the database described by `CLINIC_QUEUE_*` environment variables.
#[uniffi::export]
pub fn open_from_env() -> Result<Arc<ClinicQueueCore>, ClinicQueueError> {
    let config = QueueConfig::from_env()?;
    logging::init_logging(&config.log_filter);
    ClinicQueueCore::with_config(&config)
}

/// Install the log subscriber. Returns false if one was already installed.
#[uniffi::export]
pub fn init_logging(filter: String) -> bool {
    logging::init_logging(&filter)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicQueueCore {
    db: Arc<Mutex<Database>>,
    clock: Arc<dyn Clock>,
    token_prefix: String,
}

impl ClinicQueueCore {
    /// Open the configured database.
    pub fn with_config(config: &QueueConfig) -> Result<Arc<Self>, ClinicQueueError> {
        let db = Database::open(&config.database_path)?;
        db.set_busy_timeout(config.busy_timeout())?;
        info!(path = %config.database_path, "Opened clinic queue database");
        Ok(Self::from_parts(
            db,
            Arc::new(SystemClock),
            config.token_prefix.clone(),
        ))
    }

    /// Assemble from an open database and a clock.
    pub fn from_parts(db: Database, clock: Arc<dyn Clock>, token_prefix: String) -> Arc<Self> {
        Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            clock,
            token_prefix,
        })
    }

    fn manager<'a>(&'a self, db: &'a Database) -> QueueManager<'a> {
        QueueManager::new(db)
            .with_clock(self.clock.as_ref())
            .with_token_prefix(&self.token_prefix)
    }

    fn register(&self, name: String, email: String, role: Role) -> Result<FfiUser, ClinicQueueError> {
        if name.trim().is_empty() || email.trim().is_empty() {
            return Err(ClinicQueueError::InvalidInput(
                "Name and email are required".into(),
            ));
        }
        let db = self.db.lock()?;
        let user = User::new(name, email.trim().to_string(), role);
        db.insert_user(&user).map_err(|e| match e {
            DbError::Constraint(msg) => ClinicQueueError::InvalidInput(msg),
            other => other.into(),
        })?;
        info!(user_id = %user.user_id, role = role.as_str(), "Registered user");
        Ok(user.into())
    }
}

#[uniffi::export]
impl ClinicQueueCore {
    // =========================================================================
    // Identity Operations
    // =========================================================================

    /// Register a patient.
    pub fn register_patient(&self, name: String, email: String) -> Result<FfiUser, ClinicQueueError> {
        self.register(name, email, Role::Patient)
    }

    /// Register a doctor.
    pub fn register_doctor(&self, name: String, email: String) -> Result<FfiUser, ClinicQueueError> {
        self.register(name, email, Role::Doctor)
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: String) -> Result<Option<FfiUser>, ClinicQueueError> {
        let db = self.db.lock()?;
        Ok(db.get_user(&user_id)?.map(|u| u.into()))
    }

    /// Find a user by email.
    pub fn find_user_by_email(&self, email: String) -> Result<Option<FfiUser>, ClinicQueueError> {
        let db = self.db.lock()?;
        Ok(db.get_user_by_email(email.trim())?.map(|u| u.into()))
    }

    /// List registered doctors.
    pub fn list_doctors(&self) -> Result<Vec<FfiUser>, ClinicQueueError> {
        let db = self.db.lock()?;
        let doctors = db.list_users_by_role(Role::Doctor)?;
        Ok(doctors.into_iter().map(|u| u.into()).collect())
    }

    // =========================================================================
    // Token Lifecycle Operations
    // =========================================================================

    /// Issue a token for a patient in a doctor's queue.
    pub fn issue_token(
        &self,
        patient_id: String,
        doctor_id: String,
    ) -> Result<FfiToken, ClinicQueueError> {
        let db = self.db.lock()?;
        let token = self.manager(&db).issue(&patient_id, &doctor_id)?;
        Ok(token.into())
    }

    /// Issue a token for the patient registered under `email`.
    pub fn issue_token_by_email(
        &self,
        email: String,
        doctor_id: String,
    ) -> Result<FfiToken, ClinicQueueError> {
        let db = self.db.lock()?;
        let patient = db
            .get_user_by_email(email.trim())?
            .ok_or_else(|| ClinicQueueError::InvalidReference(format!("Patient not registered: {}", email)))?;
        let token = self.manager(&db).issue(&patient.user_id, &doctor_id)?;
        Ok(token.into())
    }

    /// Get a token by ID.
    pub fn get_token(&self, token_id: i64) -> Result<Option<FfiToken>, ClinicQueueError> {
        let db = self.db.lock()?;
        Ok(db.get_token(token_id)?.map(|t| t.into()))
    }

    /// Call the next waiting patient. `None` when the queue is empty.
    pub fn call_next(&self, doctor_id: String) -> Result<Option<FfiToken>, ClinicQueueError> {
        let db = self.db.lock()?;
        let token = self.manager(&db).call_next(&doctor_id)?;
        Ok(token.map(|t| t.into()))
    }

    /// Mark the serving token as done.
    pub fn mark_done(&self, token_id: i64) -> Result<FfiToken, ClinicQueueError> {
        let db = self.db.lock()?;
        let token = self.manager(&db).mark_done(token_id)?;
        Ok(token.into())
    }

    /// Skip a waiting or serving token.
    pub fn mark_skipped(&self, token_id: i64) -> Result<FfiToken, ClinicQueueError> {
        let db = self.db.lock()?;
        let token = self.manager(&db).mark_skipped(token_id)?;
        Ok(token.into())
    }

    // =========================================================================
    // Queue View Operations
    // =========================================================================

    /// Waiting tokens in FIFO order.
    pub fn get_queue(&self, doctor_id: String) -> Result<Vec<FfiToken>, ClinicQueueError> {
        let db = self.db.lock()?;
        let tokens = QueueView::new(&db).get_queue(&doctor_id)?;
        Ok(tokens.into_iter().map(|t| t.into()).collect())
    }

    /// Serving token followed by waiting tokens, with patient details.
    pub fn live_queue(&self, doctor_id: String) -> Result<Vec<FfiQueueEntry>, ClinicQueueError> {
        let db = self.db.lock()?;
        let entries = QueueView::new(&db).live_queue(&doctor_id)?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }

    /// Token currently being served by a doctor.
    pub fn now_serving(&self, doctor_id: String) -> Result<Option<FfiToken>, ClinicQueueError> {
        let db = self.db.lock()?;
        let token = QueueView::new(&db).now_serving(&doctor_id)?;
        Ok(token.map(|t| t.into()))
    }

    /// 1-based waiting position of a token; `None` once called.
    pub fn queue_position(&self, token_id: i64) -> Result<Option<u32>, ClinicQueueError> {
        let db = self.db.lock()?;
        let position = QueueView::new(&db).queue_position(token_id)?;
        Ok(position.map(|p| p as u32))
    }

    // =========================================================================
    // Statistics Operations
    // =========================================================================

    /// Statistics for a doctor on a `YYYY-MM-DD` date.
    pub fn get_stats(
        &self,
        doctor_id: String,
        date: String,
    ) -> Result<FfiDailyStatistic, ClinicQueueError> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|e| ClinicQueueError::InvalidInput(format!("Bad date {:?}: {}", date, e)))?;
        let db = self.db.lock()?;
        let stats = StatsAggregator::new(&db).get_stats(&doctor_id, date)?;
        Ok(stats.into())
    }

    /// Statistics for a doctor for the current (UTC) day.
    pub fn get_today_stats(&self, doctor_id: String) -> Result<FfiDailyStatistic, ClinicQueueError> {
        let today = self.clock.now().date_naive();
        let db = self.db.lock()?;
        let stats = StatsAggregator::new(&db).get_stats(&doctor_id, today)?;
        Ok(stats.into())
    }

    /// Every recorded day for a doctor, newest first.
    pub fn list_stats(&self, doctor_id: String) -> Result<Vec<FfiDailyStatistic>, ClinicQueueError> {
        let db = self.db.lock()?;
        let stats = StatsAggregator::new(&db).list_stats(&doctor_id)?;
        Ok(stats.into_iter().map(|s| s.into()).collect())
    }

    /// Export every recorded day for a doctor as JSON.
    pub fn export_stats_json(&self, doctor_id: String) -> Result<String, ClinicQueueError> {
        let db = self.db.lock()?;
        let stats = StatsAggregator::new(&db).list_stats(&doctor_id)?;
        Ok(serde_json::to_string_pretty(&stats)?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe user.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub user_id: String,
    pub role: String,
    pub name: String,
    pub email: String,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            role: user.role.as_str().to_string(),
            name: user.name,
            email: user.email,
        }
    }
}

/// FFI-safe token.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiToken {
    pub token_id: i64,
    pub token_number: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub status: String,
    pub issued_at: String,
    pub called_at: Option<String>,
    pub served_at: Option<String>,
}

impl From<Token> for FfiToken {
    fn from(token: Token) -> Self {
        Self {
            token_id: token.token_id,
            token_number: token.token_number,
            patient_id: token.patient_id,
            doctor_id: token.doctor_id,
            status: token.status.as_str().to_string(),
            issued_at: token.issued_at.to_rfc3339(),
            called_at: token.called_at.map(|t| t.to_rfc3339()),
            served_at: token.served_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// FFI-safe live queue entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQueueEntry {
    pub token: FfiToken,
    pub patient_name: String,
    pub patient_email: String,
    pub position: Option<u32>,
}

impl From<QueueEntry> for FfiQueueEntry {
    fn from(entry: QueueEntry) -> Self {
        Self {
            token: entry.token.into(),
            patient_name: entry.patient_name,
            patient_email: entry.patient_email,
            position: entry.position.map(|p| p as u32),
        }
    }
}

/// FFI-safe daily statistic.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDailyStatistic {
    pub doctor_id: String,
    pub date: String,
    pub patients_served: u32,
    pub patients_skipped: u32,
    pub avg_wait_secs: f64,
}

impl From<DailyStatistic> for FfiDailyStatistic {
    fn from(stat: DailyStatistic) -> Self {
        Self {
            doctor_id: stat.doctor_id,
            date: stat.date.format("%Y-%m-%d").to_string(),
            patients_served: stat.patients_served,
            patients_skipped: stat.patients_skipped,
            avg_wait_secs: stat.avg_wait_secs,
        }
    }
}
