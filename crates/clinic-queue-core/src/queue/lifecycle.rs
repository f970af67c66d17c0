//! Token lifecycle manager: issuance and state transitions.

use tracing::{debug, info, warn};

use super::{QueueError, QueueResult};
use crate::clock::{Clock, SystemClock};
use crate::db::{Database, DbError};
use crate::models::{format_token_number, Role, Token, TokenStatus, User};
use crate::stats::StatsAggregator;

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// Default leading segment of token numbers.
pub const DEFAULT_TOKEN_PREFIX: &str = "T";

/// Drives tokens through `waiting → serving → done | skipped`.
pub struct QueueManager<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    token_prefix: &'a str,
}

impl<'a> QueueManager<'a> {
    /// Create a manager on the wall clock.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            clock: &SYSTEM_CLOCK,
            token_prefix: DEFAULT_TOKEN_PREFIX,
        }
    }

    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_token_prefix(mut self, prefix: &'a str) -> Self {
        self.token_prefix = prefix;
        self
    }

    /// Issue a new `waiting` token for a patient in a doctor's queue.
    pub fn issue(&self, patient_id: &str, doctor_id: &str) -> QueueResult<Token> {
        self.require_user(patient_id, Role::Patient)?;
        self.require_user(doctor_id, Role::Doctor)?;

        let issued_at = self.clock.now();
        let token_number = format_token_number(self.token_prefix, doctor_id, &issued_at);
        let token = self
            .db
            .insert_token(patient_id, doctor_id, &token_number, &issued_at)?;

        info!(
            token_id = token.token_id,
            token_number = %token.token_number,
            doctor_id,
            "Issued token"
        );
        Ok(token)
    }

    /// Call the oldest waiting token of a doctor.
    ///
    /// Returns `Ok(None)` when the queue is empty. Fails with `ServerBusy` while
    /// the doctor still has a serving token; it must be marked done or skipped
    /// first.
    pub fn call_next(&self, doctor_id: &str) -> QueueResult<Option<Token>> {
        self.require_user(doctor_id, Role::Doctor)?;

        if let Some(serving) = self.db.get_serving_token(doctor_id)? {
            warn!(doctor_id, serving_token_id = serving.token_id, "Call next while serving");
            return Err(QueueError::ServerBusy {
                doctor_id: doctor_id.to_string(),
                serving_token_id: serving.token_id,
            });
        }

        match self.db.claim_next_waiting(doctor_id, &self.clock.now())? {
            Some(token) => {
                info!(token_id = token.token_id, doctor_id, "Called token");
                Ok(Some(token))
            }
            // Another caller may have claimed between the check and the update.
            None => match self.db.get_serving_token(doctor_id)? {
                Some(serving) => Err(QueueError::ServerBusy {
                    doctor_id: doctor_id.to_string(),
                    serving_token_id: serving.token_id,
                }),
                None => {
                    debug!(doctor_id, "Queue empty");
                    Ok(None)
                }
            },
        }
    }

    /// Finish the serving token. Only `serving` tokens can be marked done.
    pub fn mark_done(&self, token_id: i64) -> QueueResult<Token> {
        self.finish(token_id, TokenStatus::Done)
    }

    /// Drop a `waiting` or `serving` token from the queue.
    pub fn mark_skipped(&self, token_id: i64) -> QueueResult<Token> {
        self.finish(token_id, TokenStatus::Skipped)
    }

    /// Apply a terminal transition and fold it into the daily statistics,
    /// both in one transaction.
    fn finish(&self, token_id: i64, to: TokenStatus) -> QueueResult<Token> {
        let current = self
            .db
            .get_token(token_id)?
            .ok_or(QueueError::NotFound(token_id))?;

        if !current.status.can_transition_to(to) {
            warn!(token_id, from = %current.status, to = %to, "Rejected transition");
            return Err(QueueError::InvalidTransition {
                token_id,
                from: current.status,
                to,
            });
        }

        let tx = self.db.transaction()?;

        let updated = match self
            .db
            .update_token_status(token_id, current.status, to, &self.clock.now())?
        {
            Some(token) => token,
            None => {
                // Moved by someone else since we read it; report the state it is in now.
                let from = self
                    .db
                    .get_token(token_id)?
                    .map(|t| t.status)
                    .unwrap_or(current.status);
                return Err(QueueError::InvalidTransition { token_id, from, to });
            }
        };

        StatsAggregator::new(self.db).record_transition(&updated)?;
        tx.commit().map_err(DbError::from)?;

        info!(
            token_id,
            doctor_id = %updated.doctor_id,
            status = %updated.status,
            "Token finished"
        );
        Ok(updated)
    }

    fn require_user(&self, user_id: &str, role: Role) -> QueueResult<User> {
        match self.db.get_user(user_id)? {
            Some(user) if user.role == role => Ok(user),
            _ => Err(QueueError::InvalidReference(format!(
                "Unknown {}: {}",
                role.as_str(),
                user_id
            ))),
        }
    }
}
