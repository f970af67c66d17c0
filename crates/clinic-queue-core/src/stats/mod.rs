//! Daily statistics aggregation.
//!
//! Records are created lazily on the first terminal transition of a day and
//! updated in place afterwards. Reads of a day with no record yield a
//! zero-valued statistic rather than an error.

use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::db::{Database, DbResult};
use crate::models::{DailyStatistic, Outcome, Token};

/// Rolls token outcomes up per doctor per day.
pub struct StatsAggregator<'a> {
    db: &'a Database,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Count one outcome for `(doctor_id, date)`; `Done` also updates the mean wait.
    pub fn record_outcome(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        outcome: Outcome,
        wait: Duration,
    ) -> DbResult<DailyStatistic> {
        let mut stat = self
            .db
            .get_daily_stat(doctor_id, date)?
            .unwrap_or_else(|| DailyStatistic::empty(doctor_id.to_string(), date));

        stat.record(outcome, duration_secs(wait));
        self.db.upsert_daily_stat(&stat)?;

        debug!(
            doctor_id,
            %date,
            served = stat.patients_served,
            skipped = stat.patients_skipped,
            avg_wait_secs = stat.avg_wait_secs,
            "Updated daily statistics"
        );
        Ok(stat)
    }

    /// Fold a token that just reached a terminal state into its day's record.
    ///
    /// The day is the UTC date of `served_at`. Non-terminal tokens are ignored.
    pub fn record_transition(&self, token: &Token) -> DbResult<Option<DailyStatistic>> {
        let (Some(outcome), Some(served_at)) =
            (Outcome::from_status(token.status), token.served_at)
        else {
            return Ok(None);
        };

        let wait = served_at - token.issued_at;
        self.record_outcome(&token.doctor_id, served_at.date_naive(), outcome, wait)
            .map(Some)
    }

    /// Statistics for one doctor and day; zero-valued if nothing was recorded.
    pub fn get_stats(&self, doctor_id: &str, date: NaiveDate) -> DbResult<DailyStatistic> {
        Ok(self
            .db
            .get_daily_stat(doctor_id, date)?
            .unwrap_or_else(|| DailyStatistic::empty(doctor_id.to_string(), date)))
    }

    /// Every recorded day for a doctor, newest first.
    pub fn list_stats(&self, doctor_id: &str) -> DbResult<Vec<DailyStatistic>> {
        self.db.list_daily_stats(doctor_id)
    }
}

/// Seconds as f64; negative spans (clock skew) count as zero.
fn duration_secs(wait: Duration) -> f64 {
    let micros = wait.num_microseconds().unwrap_or(i64::MAX);
    (micros.max(0) as f64) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TokenStatus, User};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn setup_db() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let doctor = User::doctor("House".into(), "house@clinic.test".into());
        db.insert_user(&doctor).unwrap();
        (db, doctor.user_id)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_get_stats_defaults_to_zero() {
        let (db, doctor) = setup_db();
        let stats = StatsAggregator::new(&db).get_stats(&doctor, day()).unwrap();
        assert_eq!(stats, DailyStatistic::empty(doctor, day()));
    }

    #[test]
    fn test_record_outcome_persists() {
        let (db, doctor) = setup_db();
        let agg = StatsAggregator::new(&db);

        agg.record_outcome(&doctor, day(), Outcome::Done, Duration::minutes(10))
            .unwrap();
        agg.record_outcome(&doctor, day(), Outcome::Done, Duration::minutes(20))
            .unwrap();
        agg.record_outcome(&doctor, day(), Outcome::Skipped, Duration::minutes(90))
            .unwrap();

        let stats = agg.get_stats(&doctor, day()).unwrap();
        assert_eq!(stats.patients_served, 2);
        assert_eq!(stats.patients_skipped, 1);
        assert_eq!(stats.avg_wait_secs, 900.0);
    }

    #[test]
    fn test_days_are_separate() {
        let (db, doctor) = setup_db();
        let agg = StatsAggregator::new(&db);
        let next_day = day().succ_opt().unwrap();

        agg.record_outcome(&doctor, day(), Outcome::Done, Duration::minutes(1))
            .unwrap();
        agg.record_outcome(&doctor, next_day, Outcome::Skipped, Duration::zero())
            .unwrap();

        assert_eq!(agg.get_stats(&doctor, day()).unwrap().patients_served, 1);
        assert_eq!(agg.get_stats(&doctor, next_day).unwrap().patients_served, 0);
        assert_eq!(agg.list_stats(&doctor).unwrap()[0].date, next_day);
    }

    #[test]
    fn test_record_transition_ignores_live_tokens() {
        let (db, doctor) = setup_db();
        let issued = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let token = Token {
            token_id: 1,
            token_number: "T".into(),
            patient_id: "p".into(),
            doctor_id: doctor.clone(),
            status: TokenStatus::Serving,
            issued_at: issued,
            called_at: Some(issued),
            served_at: None,
        };
        assert!(StatsAggregator::new(&db)
            .record_transition(&token)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_negative_wait_clamped() {
        assert_eq!(duration_secs(Duration::seconds(-5)), 0.0);
        assert_eq!(duration_secs(Duration::milliseconds(1500)), 1.5);
    }

    proptest! {
        #[test]
        fn prop_incremental_mean_matches_arithmetic_mean(waits in prop::collection::vec(0u32..36_000, 1..50)) {
            let (db, doctor) = setup_db();
            let agg = StatsAggregator::new(&db);
            for w in &waits {
                agg.record_outcome(&doctor, day(), Outcome::Done, Duration::seconds(i64::from(*w))).unwrap();
            }

            let expected = waits.iter().map(|w| f64::from(*w)).sum::<f64>() / waits.len() as f64;
            let stats = agg.get_stats(&doctor, day()).unwrap();
            prop_assert_eq!(stats.patients_served as usize, waits.len());
            prop_assert!((stats.avg_wait_secs - expected).abs() < 1e-6);
        }
    }
}
