use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::db::LogStore;
use crate::errors::{Result, TrackerError};
use crate::models::{round2, DailyLogEntry, WeeklyPrediction};
use crate::predict::{MIN_ACTIONABLE_HOURS, PER_HOUR_EFFECT};
use crate::trainer::{fit_gap_model, TrainingRow, MIN_TRAINING_ROWS};

pub const WINDOW_DAYS: i64 = 7;
const SECONDS_PER_DAY: i64 = 86_400;

fn parse_entry_timestamp(raw: &str) -> Option<i64> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.timestamp());
    }
    // naive ISO stamps are treated as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|at| at.and_utc().timestamp())
}

fn parse_key_date(date_key: &str) -> Option<i64> {
    let prefix = date_key.get(..8)?;
    let date = NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

/// Resolution order: the entry's own timestamp, then the date encoded in
/// the store key. Entries where both fail are excluded from the window.
pub fn effective_timestamp(date_key: &str, entry: &DailyLogEntry) -> Option<i64> {
    parse_entry_timestamp(&entry.timestamp).or_else(|| parse_key_date(date_key))
}

pub fn window_rows(logs: &[(String, DailyLogEntry)], now_ts: i64) -> Vec<&(String, DailyLogEntry)> {
    let cutoff = now_ts - WINDOW_DAYS * SECONDS_PER_DAY;
    logs.iter()
        .filter(|(key, entry)| effective_timestamp(key, entry).is_some_and(|ts| ts >= cutoff))
        .collect()
}

/// Week-scoped prediction from an ephemeral model fitted on the trailing
/// 7-day window only. The persisted long-horizon model is never touched,
/// and neither the cap nor the study-sufficiency override applies.
pub async fn predict_week(store: &LogStore, user_key: &str) -> Result<WeeklyPrediction> {
    predict_week_at(store, user_key, Utc::now().timestamp()).await
}

pub async fn predict_week_at(
    store: &LogStore,
    user_key: &str,
    now_ts: i64,
) -> Result<WeeklyPrediction> {
    let logs = store.read_all(user_key).await?;
    let windowed = window_rows(&logs, now_ts);
    if windowed.len() < MIN_TRAINING_ROWS {
        return Err(TrackerError::InsufficientData {
            have: windowed.len(),
            need: MIN_TRAINING_ROWS,
        });
    }

    let rows: Vec<TrainingRow> = windowed
        .iter()
        .map(|(_, entry)| TrainingRow {
            features: entry.hour_features(),
            gap: entry.grade_gap(),
        })
        .collect();
    let model = fit_gap_model(&rows)?;

    let Some((_, last)) = windowed.last() else {
        return Err(TrackerError::InsufficientData { have: 0, need: MIN_TRAINING_ROWS });
    };
    let gap = model.predict(&last.hour_features());

    Ok(WeeklyPrediction {
        predicted_gap_week: round2(gap),
        required_hours_week: round2(f64::max(gap / PER_HOUR_EFFECT, MIN_ACTIONABLE_HOURS)),
    })
}
