//! Read-only queue projections, recomputed from the token store on every call.

use tracing::debug;

use super::{QueueError, QueueResult};
use crate::db::Database;
use crate::models::{QueueEntry, Token, TokenStatus};

/// Queue reader for doctor dashboards and patient screens.
pub struct QueueView<'a> {
    db: &'a Database,
}

impl<'a> QueueView<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Waiting tokens of a doctor, first issued first. Empty if none.
    pub fn get_queue(&self, doctor_id: &str) -> QueueResult<Vec<Token>> {
        let tokens = self.db.list_tokens(doctor_id, TokenStatus::Waiting)?;
        debug!(doctor_id, waiting = tokens.len(), "Loaded queue");
        Ok(tokens)
    }

    /// Token the doctor is currently serving, if any.
    pub fn now_serving(&self, doctor_id: &str) -> QueueResult<Option<Token>> {
        Ok(self.db.get_serving_token(doctor_id)?)
    }

    /// Serving token (if any) followed by the waiting list, with patient details
    /// and 1-based positions for waiting entries.
    pub fn live_queue(&self, doctor_id: &str) -> QueueResult<Vec<QueueEntry>> {
        let tokens = self.db.list_live_tokens(doctor_id)?;

        let mut entries = Vec::with_capacity(tokens.len());
        let mut position = 0;
        for token in tokens {
            let patient = self.db.get_user(&token.patient_id)?.ok_or_else(|| {
                QueueError::InvalidReference(format!("Unknown patient: {}", token.patient_id))
            })?;

            let entry_position = if token.status == TokenStatus::Waiting {
                position += 1;
                Some(position)
            } else {
                None
            };

            entries.push(QueueEntry {
                token,
                patient_name: patient.name,
                patient_email: patient.email,
                position: entry_position,
            });
        }
        Ok(entries)
    }

    /// 1-based place of a token among its doctor's waiting tokens.
    ///
    /// `None` once the token has been called, served or skipped.
    pub fn queue_position(&self, token_id: i64) -> QueueResult<Option<usize>> {
        let token = self
            .db
            .get_token(token_id)?
            .ok_or(QueueError::NotFound(token_id))?;

        if token.status != TokenStatus::Waiting {
            return Ok(None);
        }

        let queue = self.get_queue(&token.doctor_id)?;
        Ok(queue
            .iter()
            .position(|t| t.token_id == token_id)
            .map(|index| index + 1))
    }
}
