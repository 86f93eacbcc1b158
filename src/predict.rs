use tracing::warn;

use crate::dataset::{self, ArtifactKind, ArtifactStore, SeedRegistry};
use crate::db::LogStore;
use crate::errors::{Result, TrackerError};
use crate::models::{round2, LongPrediction};
use crate::trainer;

/// Assumed marginal effect of one study hour on the grade gap.
pub const PER_HOUR_EFFECT: f64 = 0.8;
/// Minimum actionable recommendation, and the "close enough" gap threshold.
pub const MIN_ACTIONABLE_HOURS: f64 = 0.3;
/// Hard cap on the long-horizon recommendation.
pub const MAX_RECOMMENDED_HOURS: f64 = 4.0;

pub const EFFICIENT_MESSAGE: &str = "Efficient study. Continue this.";

/// Where the "current" feature vector may come from, tried in order.
#[derive(Debug, Clone, Copy)]
enum LatestSource {
    LiveLog,
    DatasetTail,
}

const LATEST_SOURCES: [LatestSource; 2] = [LatestSource::LiveLog, LatestSource::DatasetTail];

async fn resolve_latest_features(
    store: &LogStore,
    artifacts: &ArtifactStore,
    user_key: &str,
) -> Result<[f64; 4]> {
    for source in LATEST_SOURCES {
        match source {
            LatestSource::LiveLog => match store.latest(user_key).await {
                Ok(Some((_, entry))) => return Ok(entry.hour_features()),
                Ok(None) => {}
                Err(e) => {
                    warn!(user_key, error = %e, "log store read failed, trying the dataset file");
                }
            },
            LatestSource::DatasetTail => {
                if let Some(raw) = dataset::last_row_features(artifacts, user_key)? {
                    // once a row is chosen, a bad value refuses rather than
                    // falling through to nothing
                    let mut features = [0.0f64; 4];
                    for (slot, field) in features.iter_mut().zip(raw.iter()) {
                        let value: f64 = field
                            .trim()
                            .parse()
                            .map_err(|_| TrackerError::InvalidLogValues)?;
                        *slot = value;
                    }
                    return Ok(features);
                }
            }
        }
    }
    Err(TrackerError::NoLogs)
}

/// Deterministic recommendation policy on a predicted gap and the user's
/// current study hours.
pub fn apply_policy(predicted_gap: f64, study_hours: f64) -> LongPrediction {
    let gap = round2(predicted_gap);
    if predicted_gap.abs() < MIN_ACTIONABLE_HOURS {
        return LongPrediction {
            predicted_grade_gap: gap,
            required_additional_study_hours: 0.0,
            message: Some(EFFICIENT_MESSAGE.to_string()),
        };
    }

    let needed = round2(f64::max(predicted_gap / PER_HOUR_EFFECT, MIN_ACTIONABLE_HOURS))
        .min(MAX_RECOMMENDED_HOURS);
    if study_hours >= needed {
        return LongPrediction {
            predicted_grade_gap: gap,
            required_additional_study_hours: 0.0,
            message: Some(EFFICIENT_MESSAGE.to_string()),
        };
    }

    LongPrediction {
        predicted_grade_gap: gap,
        required_additional_study_hours: needed,
        message: None,
    }
}

/// Predict from the persisted long-horizon model. A missing model gets one
/// synchronous materialize+train attempt before refusing.
pub async fn predict_long(
    store: &LogStore,
    artifacts: &ArtifactStore,
    seeds: &SeedRegistry,
    user_key: &str,
) -> Result<LongPrediction> {
    if !artifacts.exists(user_key, ArtifactKind::Model) {
        match dataset::materialize(store, artifacts, seeds, user_key).await {
            Ok(true) => {
                if let Err(e) = trainer::train(artifacts, user_key) {
                    warn!(user_key, error = %e, "synchronous training failed");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(user_key, error = %e, "synchronous materialize failed"),
        }
    }

    let Some(model) = trainer::load_model(artifacts, user_key)? else {
        return Err(TrackerError::ModelUnavailable);
    };

    let features = resolve_latest_features(store, artifacts, user_key).await?;
    Ok(apply_policy(model.predict(&features), features[0]))
}
