//! Token lifecycle and queue projections.
//!
//! Pipeline: Issue → Waiting → (call next) → Serving → Done / Skipped → Daily stats
//!
//! Queue state is never held in memory: every view is a query over the token
//! store, and every transition is a conditional update against it.

mod lifecycle;
mod view;

pub use lifecycle::*;
pub use view::*;

use thiserror::Error;

use crate::db::DbError;
use crate::models::TokenStatus;

/// Queue errors.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Token {token_id} cannot move from {from} to {to}")]
    InvalidTransition {
        token_id: i64,
        from: TokenStatus,
        to: TokenStatus,
    },

    #[error("Doctor {doctor_id} is already serving token {serving_token_id}")]
    ServerBusy {
        doctor_id: String,
        serving_token_id: i64,
    },

    #[error("Token not found: {0}")]
    NotFound(i64),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] DbError),

    #[error("Storage error: {0}")]
    Storage(#[source] DbError),
}

impl QueueError {
    /// Whether the caller should retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::StorageUnavailable(_))
    }
}

impl From<DbError> for QueueError {
    fn from(e: DbError) -> Self {
        if e.is_unavailable() {
            QueueError::StorageUnavailable(e)
        } else {
            QueueError::Storage(e)
        }
    }
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::from(e).into()
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
