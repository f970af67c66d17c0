//! Daily statistics models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::TokenStatus;

/// How a token left the queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Skipped,
}

impl Outcome {
    /// Outcome for a terminal status; `None` for `Waiting`/`Serving`.
    pub fn from_status(status: TokenStatus) -> Option<Self> {
        match status {
            TokenStatus::Done => Some(Outcome::Done),
            TokenStatus::Skipped => Some(Outcome::Skipped),
            TokenStatus::Waiting | TokenStatus::Serving => None,
        }
    }
}

/// Per (doctor, day) rollup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyStatistic {
    pub doctor_id: String,
    pub date: NaiveDate,
    pub patients_served: u32,
    pub patients_skipped: u32,
    /// Mean issuance-to-completion time of `Done` tokens, in seconds
    pub avg_wait_secs: f64,
}

impl DailyStatistic {
    /// Zero-valued record for a day with no outcomes yet.
    pub fn empty(doctor_id: String, date: NaiveDate) -> Self {
        Self {
            doctor_id,
            date,
            patients_served: 0,
            patients_skipped: 0,
            avg_wait_secs: 0.0,
        }
    }

    /// Fold one outcome into the record.
    ///
    /// Only `Done` contributes to the average, using the incremental mean
    /// `avg' = avg + (wait - avg) / n`.
    pub fn record(&mut self, outcome: Outcome, wait_secs: f64) {
        match outcome {
            Outcome::Done => {
                self.patients_served += 1;
                let n = f64::from(self.patients_served);
                self.avg_wait_secs += (wait_secs - self.avg_wait_secs) / n;
            }
            Outcome::Skipped => self.patients_skipped += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.patients_served + self.patients_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_incremental_mean() {
        let mut stat = DailyStatistic::empty("d".into(), day());
        stat.record(Outcome::Done, 600.0);
        assert_eq!(stat.avg_wait_secs, 600.0);
        stat.record(Outcome::Done, 300.0);
        assert_eq!(stat.avg_wait_secs, 450.0);
        assert_eq!(stat.patients_served, 2);
    }

    #[test]
    fn test_skip_leaves_average_alone() {
        let mut stat = DailyStatistic::empty("d".into(), day());
        stat.record(Outcome::Done, 120.0);
        stat.record(Outcome::Skipped, 9999.0);
        assert_eq!(stat.avg_wait_secs, 120.0);
        assert_eq!(stat.patients_skipped, 1);
        assert_eq!(stat.total(), 2);
    }

    #[test]
    fn test_outcome_from_status() {
        assert_eq!(Outcome::from_status(TokenStatus::Done), Some(Outcome::Done));
        assert_eq!(Outcome::from_status(TokenStatus::Skipped), Some(Outcome::Skipped));
        assert_eq!(Outcome::from_status(TokenStatus::Waiting), None);
    }
}
