use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::db::LogStore;
use crate::errors::Result;

pub const DATASET_HEADER: [&str; 8] = [
    "date",
    "current_grade",
    "target_grade",
    "study_hours",
    "sleep_hours",
    "physical_hours",
    "leisure_hours",
    "timestamp",
];

pub const FEATURE_COLUMNS: [&str; 4] = [
    "study_hours",
    "sleep_hours",
    "physical_hours",
    "leisure_hours",
];

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "current_grade",
    "target_grade",
    "study_hours",
    "sleep_hours",
    "physical_hours",
    "leisure_hours",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Dataset,
    Model,
}

impl ArtifactKind {
    fn file_name(self, user_key: &str) -> String {
        match self {
            ArtifactKind::Dataset => format!("{user_key}.csv"),
            ArtifactKind::Model => format!("{user_key}_model.json"),
        }
    }
}

/// Durable per-user artifacts, addressed by (user, kind) rather than by
/// ambient file paths. Each put fully overwrites the previous artifact.
#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path(&self, user_key: &str, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.file_name(user_key))
    }

    pub fn put(&self, user_key: &str, kind: ArtifactKind, bytes: &[u8]) -> Result<()> {
        fs::write(self.path(user_key, kind), bytes)?;
        Ok(())
    }

    pub fn get(&self, user_key: &str, kind: ArtifactKind) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(user_key, kind)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, user_key: &str, kind: ArtifactKind) -> bool {
        self.path(user_key, kind).exists()
    }
}

/// Predefined fallback rows, written verbatim when a user has no logs yet.
/// Rows follow DATASET_HEADER order.
#[derive(Debug, Clone, Default)]
pub struct SeedRegistry {
    rows: HashMap<String, Vec<[String; 8]>>,
}

impl SeedRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(
            "demo@tracker_local",
            vec![
                seed_row("20250101_090000_000000", "60", "80", "1.5", "7", "1", "2"),
                seed_row("20250102_090000_000000", "61", "80", "2", "7.5", "1", "1.5"),
                seed_row("20250103_090000_000000", "62", "80", "2.5", "7", "0.5", "2"),
                seed_row("20250104_090000_000000", "62.5", "80", "3", "6.5", "1", "1"),
            ],
        );
        registry
    }

    pub fn register(&mut self, user_key: &str, rows: Vec<[String; 8]>) {
        self.rows.insert(user_key.to_string(), rows);
    }

    fn rows_for(&self, user_key: &str) -> Option<&Vec<[String; 8]>> {
        self.rows.get(user_key)
    }
}

fn seed_row(
    date: &str,
    current: &str,
    target: &str,
    study: &str,
    sleep: &str,
    physical: &str,
    leisure: &str,
) -> [String; 8] {
    [
        date.to_string(),
        current.to_string(),
        target.to_string(),
        study.to_string(),
        sleep.to_string(),
        physical.to_string(),
        leisure.to_string(),
        format!("{}T09:00:00+00:00", &date[..8]),
    ]
}

/// Regenerate the user's dataset from stored logs, falling back to the seed
/// registry when none exist. Values pass through unmodified; numeric
/// coercion happens at training time. Returns false when there is nothing
/// to write.
pub async fn materialize(
    store: &LogStore,
    artifacts: &ArtifactStore,
    seeds: &SeedRegistry,
    user_key: &str,
) -> Result<bool> {
    let logs = store.read_all(user_key).await?;

    let mut buf = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        writer.write_record(DATASET_HEADER)?;

        if logs.is_empty() {
            let Some(rows) = seeds.rows_for(user_key) else {
                return Ok(false);
            };
            for row in rows {
                writer.write_record(row)?;
            }
        } else {
            for (date_key, entry) in &logs {
                writer.write_record(&[
                    date_key.clone(),
                    entry.current_grade.to_string(),
                    entry.target_grade.to_string(),
                    entry.study_hours.to_string(),
                    entry.sleep_hours.to_string(),
                    entry.physical_hours.to_string(),
                    entry.leisure_hours.to_string(),
                    entry.timestamp.clone(),
                ])?;
            }
        }
        writer.flush()?;
    }

    artifacts.put(user_key, ArtifactKind::Dataset, &buf)?;
    Ok(true)
}

/// Raw feature fields of the last dataset row, for the predictor's fallback
/// when live logs are unavailable. None when the dataset, its feature
/// columns or any rows are missing.
pub fn last_row_features(artifacts: &ArtifactStore, user_key: &str) -> Result<Option<[String; 4]>> {
    let Some(bytes) = artifacts.get(user_key, ArtifactKind::Dataset)? else {
        return Ok(None);
    };

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers = reader.headers()?.clone();
    let idx: Option<Vec<usize>> = FEATURE_COLUMNS
        .iter()
        .map(|column| headers.iter().position(|h| h == *column))
        .collect();
    let Some(idx) = idx else {
        return Ok(None);
    };

    let mut last = None;
    for record in reader.records() {
        last = Some(record?);
    }
    let Some(record) = last else {
        return Ok(None);
    };

    let mut raw: [String; 4] = Default::default();
    for (slot, &i) in raw.iter_mut().zip(idx.iter()) {
        *slot = record.get(i).unwrap_or("").to_string();
    }
    Ok(Some(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{artifacts_in, entry, temp_store};

    fn dataset_text(artifacts: &ArtifactStore, user_key: &str) -> String {
        let bytes = artifacts.get(user_key, ArtifactKind::Dataset).unwrap().unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn materialize_writes_header_and_sorted_rows() {
        let (store, dir) = temp_store().await;
        let artifacts = artifacts_in(&dir);
        let e1 = entry(60.0, 80.0, [1.0, 7.0, 1.0, 1.0], "2024-01-01T08:00:00+00:00");
        let e2 = entry(61.0, 80.0, [2.0, 7.0, 1.0, 1.0], "2024-01-02T08:00:00+00:00");
        store.write("u", "20240102_080000_000000", &e2).await.unwrap();
        store.write("u", "20240101_080000_000000", &e1).await.unwrap();

        let written = materialize(&store, &artifacts, &SeedRegistry::default(), "u")
            .await
            .unwrap();
        assert!(written);

        let text = dataset_text(&artifacts, "u");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], DATASET_HEADER.join(","));
        assert!(lines[1].starts_with("20240101_080000_000000,60,80,1,7,1,1"));
        assert!(lines[2].starts_with("20240102_080000_000000,61,80,2,7,1,1"));
    }

    #[tokio::test]
    async fn rematerializing_unchanged_logs_is_byte_identical() {
        let (store, dir) = temp_store().await;
        let artifacts = artifacts_in(&dir);
        let e = entry(60.0, 80.0, [2.0, 7.0, 1.0, 2.0], "2024-01-01T08:00:00+00:00");
        store.write("u", "20240101_080000_000000", &e).await.unwrap();

        materialize(&store, &artifacts, &SeedRegistry::default(), "u").await.unwrap();
        let first = artifacts.get("u", ArtifactKind::Dataset).unwrap().unwrap();
        materialize(&store, &artifacts, &SeedRegistry::default(), "u").await.unwrap();
        let second = artifacts.get("u", ArtifactKind::Dataset).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn materialize_overwrites_stale_rows() {
        let (store, dir) = temp_store().await;
        let artifacts = artifacts_in(&dir);
        let stale = b"date,current_grade\nold,1\nolder,2\n";
        artifacts.put("u", ArtifactKind::Dataset, stale).unwrap();

        let e = entry(60.0, 80.0, [2.0, 7.0, 1.0, 2.0], "2024-01-01T08:00:00+00:00");
        store.write("u", "20240101_080000_000000", &e).await.unwrap();
        materialize(&store, &artifacts, &SeedRegistry::default(), "u").await.unwrap();

        let text = dataset_text(&artifacts, "u");
        assert!(!text.contains("old"));
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn empty_logs_fall_back_to_registered_seed() {
        let (store, dir) = temp_store().await;
        let artifacts = artifacts_in(&dir);
        let mut seeds = SeedRegistry::default();
        seeds.register(
            "u",
            vec![seed_row("20240101_090000_000000", "55", "75", "2", "8", "1", "1")],
        );

        let written = materialize(&store, &artifacts, &seeds, "u").await.unwrap();
        assert!(written);
        let text = dataset_text(&artifacts, "u");
        assert!(text.contains("20240101_090000_000000,55,75,2,8,1,1"));
    }

    #[tokio::test]
    async fn empty_logs_without_seed_produce_nothing() {
        let (store, dir) = temp_store().await;
        let artifacts = artifacts_in(&dir);

        let written = materialize(&store, &artifacts, &SeedRegistry::default(), "u")
            .await
            .unwrap();
        assert!(!written);
        assert!(!artifacts.exists("u", ArtifactKind::Dataset));
    }

    #[tokio::test]
    async fn last_row_features_reads_the_newest_row() {
        let (store, dir) = temp_store().await;
        let artifacts = artifacts_in(&dir);
        let e1 = entry(60.0, 80.0, [1.0, 7.0, 1.0, 1.0], "t1");
        let e2 = entry(61.0, 80.0, [3.5, 6.0, 0.5, 2.0], "t2");
        store.write("u", "20240101_080000_000000", &e1).await.unwrap();
        store.write("u", "20240102_080000_000000", &e2).await.unwrap();
        materialize(&store, &artifacts, &SeedRegistry::default(), "u").await.unwrap();

        let raw = last_row_features(&artifacts, "u").unwrap().unwrap();
        assert_eq!(raw, ["3.5", "6", "0.5", "2"].map(String::from));
    }

    #[test]
    fn last_row_features_requires_feature_columns() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifacts = artifacts_in(&dir);
        artifacts
            .put("u", ArtifactKind::Dataset, b"date,current_grade\n20240101,60\n")
            .unwrap();
        assert!(last_row_features(&artifacts, "u").unwrap().is_none());
    }

    #[test]
    fn missing_dataset_yields_no_features() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifacts = artifacts_in(&dir);
        assert!(last_row_features(&artifacts, "u").unwrap().is_none());
    }
}
