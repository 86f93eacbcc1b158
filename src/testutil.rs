use chrono::{Duration, Utc};
use tempfile::TempDir;

use crate::dataset::ArtifactStore;
use crate::db::LogStore;
use crate::models::{date_key_at, DailyLogEntry};

pub async fn temp_store() -> (LogStore, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = LogStore::connect(&dir.path().join("logs.db"))
        .await
        .expect("connect log store");
    store.init().await.expect("init schema");
    (store, dir)
}

pub fn artifacts_in(dir: &TempDir) -> ArtifactStore {
    ArtifactStore::new(dir.path().join("artifacts")).expect("artifact store")
}

pub fn entry(current: f64, target: f64, hours: [f64; 4], timestamp: &str) -> DailyLogEntry {
    DailyLogEntry {
        current_grade: current,
        target_grade: target,
        study_hours: hours[0],
        sleep_hours: hours[1],
        physical_hours: hours[2],
        leisure_hours: hours[3],
        timestamp: timestamp.to_string(),
    }
}

pub fn key_days_ago(days: i64) -> String {
    date_key_at(Utc::now() - Duration::days(days))
}

pub fn rfc3339_days_ago(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339()
}
