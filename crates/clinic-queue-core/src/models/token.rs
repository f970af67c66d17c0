//! Queue token models and the token state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token status.
///
/// ```text
///             call_next            mark_done
///   Waiting ───────────▶ Serving ───────────▶ Done
///      │                    │
///      │    mark_skipped    │ mark_skipped
///      └────────────────────┴───────────────▶ Skipped
/// ```
///
/// `Done` and `Skipped` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Issued, waiting to be called
    Waiting,
    /// Called by the doctor, currently in consultation
    Serving,
    /// Consultation finished
    Done,
    /// Removed from the queue without being served
    Skipped,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Waiting => "waiting",
            TokenStatus::Serving => "serving",
            TokenStatus::Done => "done",
            TokenStatus::Skipped => "skipped",
        }
    }

    /// True for `Done` and `Skipped`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Done | TokenStatus::Skipped)
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(&self, next: TokenStatus) -> bool {
        matches!(
            (self, next),
            (TokenStatus::Waiting, TokenStatus::Serving)
                | (TokenStatus::Waiting, TokenStatus::Skipped)
                | (TokenStatus::Serving, TokenStatus::Done)
                | (TokenStatus::Serving, TokenStatus::Skipped)
        )
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queue ticket linking a patient to a doctor for one visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// Sequential identity assigned by the store
    pub token_id: i64,
    /// Human-readable number shown on screens (e.g. `T-<doctor>-093000`)
    pub token_number: String,
    /// Owning patient
    pub patient_id: String,
    /// Doctor serving this token
    pub doctor_id: String,
    pub status: TokenStatus,
    pub issued_at: DateTime<Utc>,
    /// When the doctor called the token (set on `Serving`)
    pub called_at: Option<DateTime<Utc>>,
    /// Set if and only if the status is terminal
    pub served_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Elapsed time from issuance to completion, once terminal.
    pub fn wait_duration(&self) -> Option<chrono::Duration> {
        self.served_at.map(|served| served - self.issued_at)
    }
}

/// Build the display number for a token: `<prefix>-<doctor>-<HHMMSS>`.
pub fn format_token_number(prefix: &str, doctor_id: &str, issued_at: &DateTime<Utc>) -> String {
    format!("{}-{}-{}", prefix, doctor_id, issued_at.format("%H%M%S"))
}

/// Queue projection row with the patient details the dashboards display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub token: Token,
    pub patient_name: String,
    pub patient_email: String,
    /// 1-based place among waiting tokens; `None` for the serving token
    pub position: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ALL: [TokenStatus; 4] = [
        TokenStatus::Waiting,
        TokenStatus::Serving,
        TokenStatus::Done,
        TokenStatus::Skipped,
    ];

    #[test]
    fn test_terminal_states_are_absorbing() {
        for from in [TokenStatus::Done, TokenStatus::Skipped] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_nothing_returns_to_waiting() {
        for from in ALL {
            assert!(!from.can_transition_to(TokenStatus::Waiting));
        }
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(TokenStatus::Waiting.can_transition_to(TokenStatus::Serving));
        assert!(TokenStatus::Waiting.can_transition_to(TokenStatus::Skipped));
        assert!(TokenStatus::Serving.can_transition_to(TokenStatus::Done));
        assert!(TokenStatus::Serving.can_transition_to(TokenStatus::Skipped));
        assert!(!TokenStatus::Waiting.can_transition_to(TokenStatus::Done));
    }

    #[test]
    fn test_token_number_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(format_token_number("T", "7", &at), "T-7-090507");
    }

    #[test]
    fn test_wait_duration() {
        let issued = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut token = Token {
            token_id: 1,
            token_number: "T-1-090000".into(),
            patient_id: "p".into(),
            doctor_id: "d".into(),
            status: TokenStatus::Waiting,
            issued_at: issued,
            called_at: None,
            served_at: None,
        };
        assert!(token.wait_duration().is_none());

        token.status = TokenStatus::Done;
        token.served_at = Some(issued + chrono::Duration::minutes(12));
        assert_eq!(token.wait_duration(), Some(chrono::Duration::minutes(12)));
    }
}
