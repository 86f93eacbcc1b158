use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::dataset::{self, ArtifactStore, SeedRegistry};
use crate::db::LogStore;
use crate::errors::Result;
use crate::trainer;

#[derive(Debug, Clone, Copy, Default)]
pub struct RetrainOutcome {
    pub dataset_written: bool,
    pub model_trained: bool,
}

struct RetrainJob {
    user_key: String,
    ack: oneshot::Sender<RetrainOutcome>,
}

/// Enqueues retrain jobs for the background worker. Cloneable; the write
/// path holds one and never blocks on the work itself.
#[derive(Clone)]
pub struct RetrainHandle {
    tx: mpsc::UnboundedSender<RetrainJob>,
}

impl RetrainHandle {
    /// Fire-and-forget by dropping the returned receiver; await it to
    /// observe the run deterministically (tests, CLI).
    pub fn enqueue(&self, user_key: &str) -> oneshot::Receiver<RetrainOutcome> {
        let (ack, rx) = oneshot::channel();
        let job = RetrainJob {
            user_key: user_key.to_string(),
            ack,
        };
        if self.tx.send(job).is_err() {
            warn!(user_key, "retrain worker is gone, dropping job");
        }
        rx
    }
}

/// Detached worker that re-materializes and retrains after each log write.
/// Jobs drain sequentially, which also serializes same-user retrains.
/// Failures never reach the write path that triggered them.
pub fn spawn_retrain_worker(
    store: LogStore,
    artifacts: ArtifactStore,
    seeds: Arc<SeedRegistry>,
) -> RetrainHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<RetrainJob>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let outcome = match run_retrain(&store, &artifacts, &seeds, &job.user_key).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(user_key = %job.user_key, error = %e, "background retrain failed");
                    RetrainOutcome::default()
                }
            };
            let _ = job.ack.send(outcome);
        }
    });
    RetrainHandle { tx }
}

async fn run_retrain(
    store: &LogStore,
    artifacts: &ArtifactStore,
    seeds: &SeedRegistry,
    user_key: &str,
) -> Result<RetrainOutcome> {
    let dataset_written = dataset::materialize(store, artifacts, seeds, user_key).await?;
    let model_trained = if dataset_written {
        trainer::train(artifacts, user_key)?
    } else {
        false
    };
    Ok(RetrainOutcome {
        dataset_written,
        model_trained,
    })
}
