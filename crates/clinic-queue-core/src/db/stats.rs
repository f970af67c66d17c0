//! Daily statistics database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::DailyStatistic;

const DATE_FORMAT: &str = "%Y-%m-%d";

impl Database {
    /// Get the record for one doctor and day, if any outcome was recorded.
    pub fn get_daily_stat(
        &self,
        doctor_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<DailyStatistic>> {
        self.conn
            .query_row(
                r#"
                SELECT doctor_id, stat_date, patients_served, patients_skipped, avg_wait_secs
                FROM daily_stats
                WHERE doctor_id = ?1 AND stat_date = ?2
                "#,
                params![doctor_id, date.format(DATE_FORMAT).to_string()],
                read_stat_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Insert or replace the record for `(doctor_id, date)`.
    pub fn upsert_daily_stat(&self, stat: &DailyStatistic) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO daily_stats (
                doctor_id, stat_date, patients_served, patients_skipped, avg_wait_secs
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (doctor_id, stat_date) DO UPDATE SET
                patients_served = excluded.patients_served,
                patients_skipped = excluded.patients_skipped,
                avg_wait_secs = excluded.avg_wait_secs,
                updated_at = datetime('now')
            "#,
            params![
                stat.doctor_id,
                stat.date.format(DATE_FORMAT).to_string(),
                stat.patients_served,
                stat.patients_skipped,
                stat.avg_wait_secs,
            ],
        )?;
        Ok(())
    }

    /// All records for a doctor, newest day first.
    pub fn list_daily_stats(&self, doctor_id: &str) -> DbResult<Vec<DailyStatistic>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT doctor_id, stat_date, patients_served, patients_skipped, avg_wait_secs
            FROM daily_stats
            WHERE doctor_id = ?
            ORDER BY stat_date DESC
            "#,
        )?;

        let rows = stmt.query_map([doctor_id], read_stat_row)?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?.try_into()?);
        }
        Ok(stats)
    }
}

/// Intermediate row struct for database mapping.
struct StatRow {
    doctor_id: String,
    stat_date: String,
    patients_served: u32,
    patients_skipped: u32,
    avg_wait_secs: f64,
}

fn read_stat_row(row: &Row<'_>) -> rusqlite::Result<StatRow> {
    Ok(StatRow {
        doctor_id: row.get(0)?,
        stat_date: row.get(1)?,
        patients_served: row.get(2)?,
        patients_skipped: row.get(3)?,
        avg_wait_secs: row.get(4)?,
    })
}

impl TryFrom<StatRow> for DailyStatistic {
    type Error = DbError;

    fn try_from(row: StatRow) -> Result<Self, Self::Error> {
        Ok(DailyStatistic {
            doctor_id: row.doctor_id,
            date: NaiveDate::parse_from_str(&row.stat_date, DATE_FORMAT)?,
            patients_served: row.patients_served,
            patients_skipped: row.patients_skipped,
            avg_wait_secs: row.avg_wait_secs,
        })
    }
}
