//! Token store operations.
//!
//! Every status change is a single conditional `UPDATE`: it applies only if the
//! row is still in the expected source state, so two writers can never both
//! move the same token.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_sql_timestamp, to_sql_timestamp, Database, DbError, DbResult};
use crate::models::{Token, TokenStatus};

const TOKEN_COLUMNS: &str =
    "token_id, token_number, patient_id, doctor_id, status, issued_at, called_at, served_at";

impl Database {
    /// Insert a new `waiting` token and return it with its assigned ID.
    pub fn insert_token(
        &self,
        patient_id: &str,
        doctor_id: &str,
        token_number: &str,
        issued_at: &DateTime<Utc>,
    ) -> DbResult<Token> {
        // Stored with microsecond precision; keep the returned value identical to a re-read.
        let issued_at = issued_at.trunc_subsecs(6);

        self.conn.execute(
            r#"
            INSERT INTO tokens (token_number, patient_id, doctor_id, status, issued_at)
            VALUES (?1, ?2, ?3, 'waiting', ?4)
            "#,
            params![
                token_number,
                patient_id,
                doctor_id,
                to_sql_timestamp(&issued_at),
            ],
        )?;

        Ok(Token {
            token_id: self.conn.last_insert_rowid(),
            token_number: token_number.to_string(),
            patient_id: patient_id.to_string(),
            doctor_id: doctor_id.to_string(),
            status: TokenStatus::Waiting,
            issued_at,
            called_at: None,
            served_at: None,
        })
    }

    /// Get a token by ID.
    pub fn get_token(&self, token_id: i64) -> DbResult<Option<Token>> {
        self.conn
            .query_row(
                &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_id = ?"),
                [token_id],
                read_token_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List a doctor's tokens in one status, oldest issued first.
    pub fn list_tokens(&self, doctor_id: &str, status: TokenStatus) -> DbResult<Vec<Token>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {TOKEN_COLUMNS}
            FROM tokens
            WHERE doctor_id = ?1 AND status = ?2
            ORDER BY issued_at ASC, token_id ASC
            "#
        ))?;

        let rows = stmt.query_map(params![doctor_id, status.as_str()], read_token_row)?;

        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(row?.try_into()?);
        }
        Ok(tokens)
    }

    /// List the serving token (if any) followed by waiting tokens in FIFO order.
    pub fn list_live_tokens(&self, doctor_id: &str) -> DbResult<Vec<Token>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {TOKEN_COLUMNS}
            FROM tokens
            WHERE doctor_id = ?1 AND status IN ('serving', 'waiting')
            ORDER BY CASE status WHEN 'serving' THEN 0 ELSE 1 END,
                     issued_at ASC, token_id ASC
            "#
        ))?;

        let rows = stmt.query_map([doctor_id], read_token_row)?;

        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(row?.try_into()?);
        }
        Ok(tokens)
    }

    /// Get the token a doctor is currently serving.
    pub fn get_serving_token(&self, doctor_id: &str) -> DbResult<Option<Token>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {TOKEN_COLUMNS} FROM tokens WHERE doctor_id = ? AND status = 'serving'"
                ),
                [doctor_id],
                read_token_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Move a token from `from` to `to`, stamping `at` into `called_at` or `served_at`.
    ///
    /// Returns `None` when the token does not exist or is no longer in `from`.
    pub fn update_token_status(
        &self,
        token_id: i64,
        from: TokenStatus,
        to: TokenStatus,
        at: &DateTime<Utc>,
    ) -> DbResult<Option<Token>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    UPDATE tokens SET
                        status = ?3,
                        called_at = CASE WHEN ?3 = 'serving' THEN ?4 ELSE called_at END,
                        served_at = CASE WHEN ?3 IN ('done', 'skipped') THEN ?4 ELSE served_at END
                    WHERE token_id = ?1 AND status = ?2
                    RETURNING {TOKEN_COLUMNS}
                    "#
                ),
                params![token_id, from.as_str(), to.as_str(), to_sql_timestamp(at)],
                read_token_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Atomically pick the oldest waiting token of a doctor and mark it serving.
    ///
    /// The select and the transition happen in one statement, which also refuses
    /// to claim while the doctor already has a serving token. Returns `None` when
    /// nothing was claimed.
    pub fn claim_next_waiting(
        &self,
        doctor_id: &str,
        at: &DateTime<Utc>,
    ) -> DbResult<Option<Token>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    UPDATE tokens SET status = 'serving', called_at = ?2
                    WHERE token_id = (
                        SELECT token_id FROM tokens
                        WHERE doctor_id = ?1 AND status = 'waiting'
                        ORDER BY issued_at ASC, token_id ASC
                        LIMIT 1
                    )
                    AND status = 'waiting'
                    AND NOT EXISTS (
                        SELECT 1 FROM tokens WHERE doctor_id = ?1 AND status = 'serving'
                    )
                    RETURNING {TOKEN_COLUMNS}
                    "#
                ),
                params![doctor_id, to_sql_timestamp(at)],
                read_token_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

/// Intermediate row struct for database mapping.
struct TokenRow {
    token_id: i64,
    token_number: String,
    patient_id: String,
    doctor_id: String,
    status: String,
    issued_at: String,
    called_at: Option<String>,
    served_at: Option<String>,
}

fn read_token_row(row: &Row<'_>) -> rusqlite::Result<TokenRow> {
    Ok(TokenRow {
        token_id: row.get(0)?,
        token_number: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_id: row.get(3)?,
        status: row.get(4)?,
        issued_at: row.get(5)?,
        called_at: row.get(6)?,
        served_at: row.get(7)?,
    })
}

impl TryFrom<TokenRow> for Token {
    type Error = DbError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(Token {
            token_id: row.token_id,
            token_number: row.token_number,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            status: string_to_status(&row.status)?,
            issued_at: from_sql_timestamp(&row.issued_at)?,
            called_at: row.called_at.as_deref().map(from_sql_timestamp).transpose()?,
            served_at: row.served_at.as_deref().map(from_sql_timestamp).transpose()?,
        })
    }
}

fn string_to_status(s: &str) -> Result<TokenStatus, DbError> {
    match s {
        "waiting" => Ok(TokenStatus::Waiting),
        "serving" => Ok(TokenStatus::Serving),
        "done" => Ok(TokenStatus::Done),
        "skipped" => Ok(TokenStatus::Skipped),
        _ => Err(DbError::Constraint(format!("Unknown token status: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::{Duration, TimeZone};

    fn setup_db() -> (Database, String, String) {
        let db = Database::open_in_memory().unwrap();
        let patient = User::patient("Ada".into(), "ada@clinic.test".into());
        let doctor = User::doctor("House".into(), "house@clinic.test".into());
        db.insert_user(&patient).unwrap();
        db.insert_user(&doctor).unwrap();
        (db, patient.user_id, doctor.user_id)
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let (db, patient, doctor) = setup_db();

        let token = db.insert_token(&patient, &doctor, "T-1", &at(0)).unwrap();
        assert_eq!(token.status, TokenStatus::Waiting);

        let retrieved = db.get_token(token.token_id).unwrap().unwrap();
        assert_eq!(retrieved, token);
        assert!(db.get_token(token.token_id + 100).unwrap().is_none());
    }

    #[test]
    fn test_ids_are_sequential() {
        let (db, patient, doctor) = setup_db();

        let a = db.insert_token(&patient, &doctor, "T-1", &at(0)).unwrap();
        let b = db.insert_token(&patient, &doctor, "T-2", &at(1)).unwrap();
        assert_eq!(b.token_id, a.token_id + 1);
    }

    #[test]
    fn test_list_orders_by_issue_time() {
        let (db, patient, doctor) = setup_db();

        // Inserted out of order on purpose
        let late = db.insert_token(&patient, &doctor, "T-late", &at(10)).unwrap();
        let early = db.insert_token(&patient, &doctor, "T-early", &at(5)).unwrap();

        let waiting = db.list_tokens(&doctor, TokenStatus::Waiting).unwrap();
        let ids: Vec<_> = waiting.iter().map(|t| t.token_id).collect();
        assert_eq!(ids, vec![early.token_id, late.token_id]);
    }

    #[test]
    fn test_same_instant_breaks_ties_by_id() {
        let (db, patient, doctor) = setup_db();

        let a = db.insert_token(&patient, &doctor, "T-a", &at(0)).unwrap();
        let b = db.insert_token(&patient, &doctor, "T-b", &at(0)).unwrap();

        let waiting = db.list_tokens(&doctor, TokenStatus::Waiting).unwrap();
        assert_eq!(waiting[0].token_id, a.token_id);
        assert_eq!(waiting[1].token_id, b.token_id);
    }

    #[test]
    fn test_update_requires_expected_state() {
        let (db, patient, doctor) = setup_db();
        let token = db.insert_token(&patient, &doctor, "T-1", &at(0)).unwrap();

        // Not serving yet: conditional update does nothing
        let result = db
            .update_token_status(token.token_id, TokenStatus::Serving, TokenStatus::Done, &at(5))
            .unwrap();
        assert!(result.is_none());

        let served = db
            .update_token_status(token.token_id, TokenStatus::Waiting, TokenStatus::Skipped, &at(5))
            .unwrap()
            .unwrap();
        assert_eq!(served.status, TokenStatus::Skipped);
        assert_eq!(served.served_at, Some(at(5)));
        assert!(served.called_at.is_none());
    }

    #[test]
    fn test_claim_takes_oldest_and_sets_called_at() {
        let (db, patient, doctor) = setup_db();
        let first = db.insert_token(&patient, &doctor, "T-1", &at(0)).unwrap();
        db.insert_token(&patient, &doctor, "T-2", &at(5)).unwrap();

        let claimed = db.claim_next_waiting(&doctor, &at(7)).unwrap().unwrap();
        assert_eq!(claimed.token_id, first.token_id);
        assert_eq!(claimed.status, TokenStatus::Serving);
        assert_eq!(claimed.called_at, Some(at(7)));
        assert!(claimed.served_at.is_none());

        let serving = db.get_serving_token(&doctor).unwrap().unwrap();
        assert_eq!(serving.token_id, first.token_id);
    }

    #[test]
    fn test_claim_refuses_while_serving() {
        let (db, patient, doctor) = setup_db();
        db.insert_token(&patient, &doctor, "T-1", &at(0)).unwrap();
        db.insert_token(&patient, &doctor, "T-2", &at(5)).unwrap();

        assert!(db.claim_next_waiting(&doctor, &at(6)).unwrap().is_some());
        assert!(db.claim_next_waiting(&doctor, &at(7)).unwrap().is_none());
        assert_eq!(db.list_tokens(&doctor, TokenStatus::Waiting).unwrap().len(), 1);
    }

    #[test]
    fn test_claim_on_empty_queue() {
        let (db, _patient, doctor) = setup_db();
        assert!(db.claim_next_waiting(&doctor, &at(0)).unwrap().is_none());
    }

    #[test]
    fn test_live_tokens_put_serving_first() {
        let (db, patient, doctor) = setup_db();
        db.insert_token(&patient, &doctor, "T-1", &at(0)).unwrap();
        db.insert_token(&patient, &doctor, "T-2", &at(5)).unwrap();
        let third = db.insert_token(&patient, &doctor, "T-3", &at(10)).unwrap();

        // Skip the oldest so the second becomes the serving one
        let first = db.list_tokens(&doctor, TokenStatus::Waiting).unwrap()[0].token_id;
        db.update_token_status(first, TokenStatus::Waiting, TokenStatus::Skipped, &at(11))
            .unwrap();
        let serving = db.claim_next_waiting(&doctor, &at(12)).unwrap().unwrap();

        let live = db.list_live_tokens(&doctor).unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].token_id, serving.token_id);
        assert_eq!(live[1].token_id, third.token_id);
    }

    #[test]
    fn test_subsecond_precision_round_trips() {
        let (db, patient, doctor) = setup_db();
        let issued = at(0) + Duration::nanoseconds(123_456_789);

        let token = db.insert_token(&patient, &doctor, "T-1", &issued).unwrap();
        let retrieved = db.get_token(token.token_id).unwrap().unwrap();
        assert_eq!(retrieved.issued_at, token.issued_at);
        assert_eq!(token.issued_at, at(0) + Duration::microseconds(123_456));
    }
}
