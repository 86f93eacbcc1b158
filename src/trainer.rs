use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::dataset::{ArtifactKind, ArtifactStore, REQUIRED_COLUMNS};
use crate::errors::{Result, TrackerError};

/// Minimum valid rows for a four-feature fit to be determined.
pub const MIN_TRAINING_ROWS: usize = 3;

/// Persisted per-user regression. The fitted estimator's parameters are
/// extracted and stored directly; prediction is a dot product plus
/// intercept, so loading never needs the fitting machinery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapModel {
    pub version: u32,
    pub trained_at: DateTime<Utc>,
    pub samples: usize,
    pub coefficients: [f64; 4],
    pub intercept: f64,
}

impl GapModel {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn predict(&self, features: &[f64; 4]) -> f64 {
        self.coefficients
            .iter()
            .zip(features.iter())
            .map(|(c, x)| c * x)
            .sum::<f64>()
            + self.intercept
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingRow {
    pub features: [f64; 4],
    pub gap: f64,
}

const PIVOT_EPS: f64 = 1e-10;

/// Ordinary least squares over the four habit-hour features, target =
/// grade gap. Solved through the normal equations on centered data, so the
/// intercept falls out as `mean(y) - w . mean(x)`.
pub fn fit_gap_model(rows: &[TrainingRow]) -> Result<GapModel> {
    if rows.is_empty() {
        return Err(TrackerError::Fit("no training rows".into()));
    }
    let flat: Vec<f64> = rows
        .iter()
        .flat_map(|row| row.features.iter().copied())
        .collect();
    let x = Array2::from_shape_vec((rows.len(), 4), flat)
        .map_err(|e| TrackerError::Fit(e.to_string()))?;
    let y = Array1::from_vec(rows.iter().map(|row| row.gap).collect());

    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| TrackerError::Fit("empty feature matrix".into()))?;
    let y_mean = y.mean().unwrap_or(0.0);
    let xc = &x - &x_mean;
    let yc = &y - y_mean;

    let gram = xc.t().dot(&xc);
    let rhs = xc.t().dot(&yc);
    let weights = solve_gram(gram, rhs);
    let intercept = y_mean - weights.dot(&x_mean);

    Ok(GapModel {
        version: GapModel::CURRENT_VERSION,
        trained_at: Utc::now(),
        samples: rows.len(),
        coefficients: [weights[0], weights[1], weights[2], weights[3]],
        intercept,
    })
}

/// Gauss elimination specialized to the symmetric positive semidefinite
/// Gram matrix: a vanishing diagonal entry means its whole row and column
/// vanish too (a linearly dependent feature), so that weight is pinned to
/// zero instead of failing the fit. The system stays consistent, and fitted
/// values at the training rows match any other least-squares solution.
fn solve_gram(mut a: Array2<f64>, mut b: Array1<f64>) -> Array1<f64> {
    let n = b.len();
    for i in 0..n {
        let pivot = a[[i, i]];
        if pivot.abs() < PIVOT_EPS {
            continue;
        }
        for k in (i + 1)..n {
            let factor = a[[k, i]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in i..n {
                a[[k, j]] -= factor * a[[i, j]];
            }
            b[k] -= factor * b[i];
        }
    }

    let mut solution = Array1::zeros(n);
    for i in (0..n).rev() {
        let pivot = a[[i, i]];
        if pivot.abs() < PIVOT_EPS {
            continue;
        }
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[[i, j]] * solution[j];
        }
        solution[i] = sum / pivot;
    }
    solution
}

/// Dataset rows that survive cleaning: all six required columns present as
/// finite numbers. None means a required column is missing from the header
/// entirely.
pub fn clean_training_rows(bytes: &[u8]) -> Result<Option<Vec<TrainingRow>>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers()?.clone();
    let idx: Option<Vec<usize>> = REQUIRED_COLUMNS
        .iter()
        .map(|column| headers.iter().position(|h| h == *column))
        .collect();
    let Some(idx) = idx else {
        return Ok(None);
    };

    let mut rows = Vec::new();
    'records: for record in reader.records() {
        let record = record?;
        // order: current_grade, target_grade, study, sleep, physical, leisure
        let mut values = [0.0f64; 6];
        for (slot, &i) in values.iter_mut().zip(idx.iter()) {
            let Some(field) = record.get(i) else {
                continue 'records;
            };
            let Ok(value) = field.trim().parse::<f64>() else {
                continue 'records;
            };
            if !value.is_finite() {
                continue 'records;
            }
            *slot = value;
        }
        rows.push(TrainingRow {
            features: [values[2], values[3], values[4], values[5]],
            gap: values[1] - values[0],
        });
    }
    Ok(Some(rows))
}

/// Fit and persist the user's long-horizon model, overwriting any prior
/// one. False when the dataset is missing, lacks required columns, or has
/// fewer than MIN_TRAINING_ROWS valid rows.
pub fn train(artifacts: &ArtifactStore, user_key: &str) -> Result<bool> {
    let Some(bytes) = artifacts.get(user_key, ArtifactKind::Dataset)? else {
        return Ok(false);
    };
    let Some(rows) = clean_training_rows(&bytes)? else {
        return Ok(false);
    };
    if rows.len() < MIN_TRAINING_ROWS {
        return Ok(false);
    }

    let model = fit_gap_model(&rows)?;
    let blob = serde_json::to_vec_pretty(&model)?;
    artifacts.put(user_key, ArtifactKind::Model, &blob)?;
    Ok(true)
}

pub fn load_model(artifacts: &ArtifactStore, user_key: &str) -> Result<Option<GapModel>> {
    let Some(bytes) = artifacts.get(user_key, ArtifactKind::Model)? else {
        return Ok(None);
    };
    let model =
        serde_json::from_slice(&bytes).map_err(|e| TrackerError::CorruptArtifact(e.to_string()))?;
    Ok(Some(model))
}
