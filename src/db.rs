use std::path::Path;

use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::oneshot;

use crate::errors::Result;
use crate::models::{date_key_at, date_key_now, DailyLogEntry, LogSubmission};
use crate::retrain::{RetrainHandle, RetrainOutcome};

/// Keyed per-user log store. Keys are sortable strings; ascending key order
/// is chronological order.
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_logs (
                user_key TEXT NOT NULL,
                date_key TEXT NOT NULL,
                current_grade REAL NOT NULL,
                target_grade REAL NOT NULL,
                study_hours REAL NOT NULL,
                sleep_hours REAL NOT NULL,
                physical_hours REAL NOT NULL,
                leisure_hours REAL NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (user_key, date_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entries are immutable: a duplicate key is ignored, never overwritten.
    pub async fn write(&self, user_key: &str, date_key: &str, entry: &DailyLogEntry) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO daily_logs
            (user_key, date_key, current_grade, target_grade,
             study_hours, sleep_hours, physical_hours, leisure_hours, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_key, date_key) DO NOTHING
            "#,
        )
        .bind(user_key)
        .bind(date_key)
        .bind(entry.current_grade)
        .bind(entry.target_grade)
        .bind(entry.study_hours)
        .bind(entry.sleep_hours)
        .bind(entry.physical_hours)
        .bind(entry.leisure_hours)
        .bind(&entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn read_all(&self, user_key: &str) -> Result<Vec<(String, DailyLogEntry)>> {
        let rows = sqlx::query(
            r#"
            SELECT date_key, current_grade, target_grade,
                   study_hours, sleep_hours, physical_hours, leisure_hours, timestamp
            FROM daily_logs
            WHERE user_key = ?
            ORDER BY date_key ASC
            "#,
        )
        .bind(user_key)
        .fetch_all(&self.pool)
        .await?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in rows {
            logs.push((row.get("date_key"), entry_from_row(&row)));
        }
        Ok(logs)
    }

    pub async fn latest(&self, user_key: &str) -> Result<Option<(String, DailyLogEntry)>> {
        let row = sqlx::query(
            r#"
            SELECT date_key, current_grade, target_grade,
                   study_hours, sleep_hours, physical_hours, leisure_hours, timestamp
            FROM daily_logs
            WHERE user_key = ?
            ORDER BY date_key DESC
            LIMIT 1
            "#,
        )
        .bind(user_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| (row.get("date_key"), entry_from_row(&row))))
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> DailyLogEntry {
    DailyLogEntry {
        current_grade: row.get("current_grade"),
        target_grade: row.get("target_grade"),
        study_hours: row.get("study_hours"),
        sleep_hours: row.get("sleep_hours"),
        physical_hours: row.get("physical_hours"),
        leisure_hours: row.get("leisure_hours"),
        timestamp: row.get("timestamp"),
    }
}

/// Caller-facing write path: validate, append, kick off a background
/// retrain. The returned receiver resolves when that retrain finishes;
/// dropping it keeps the write fire-and-forget.
pub async fn save_log(
    store: &LogStore,
    retrain: &RetrainHandle,
    user_key: &str,
    submission: LogSubmission,
) -> Result<(String, oneshot::Receiver<RetrainOutcome>)> {
    let entry = submission.into_entry()?;
    let date_key = date_key_now();
    store.write(user_key, &date_key, &entry).await?;
    let ack = retrain.enqueue(user_key);
    Ok((date_key, ack))
}

/// Realistic recent logs for the demo user, dated relative to now so the
/// weekly predictor has qualifying rows.
pub async fn seed_demo_logs(store: &LogStore, user_key: &str) -> Result<usize> {
    let samples: [(i64, f64, f64, [f64; 4]); 4] = [
        (3, 62.0, 80.0, [1.5, 7.0, 1.0, 2.0]),
        (2, 63.0, 80.0, [2.0, 7.5, 1.0, 1.5]),
        (1, 64.0, 80.0, [2.5, 7.0, 0.5, 2.0]),
        (0, 64.5, 80.0, [3.0, 6.5, 1.0, 1.0]),
    ];

    let mut inserted = 0usize;
    for (days_ago, current, target, hours) in samples {
        let at = Utc::now() - Duration::days(days_ago);
        let entry = DailyLogEntry {
            current_grade: current,
            target_grade: target,
            study_hours: hours[0],
            sleep_hours: hours[1],
            physical_hours: hours[2],
            leisure_hours: hours[3],
            timestamp: at.to_rfc3339(),
        };
        if store.write(user_key, &date_key_at(at), &entry).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}
