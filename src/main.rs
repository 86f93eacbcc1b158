use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

mod dataset;
mod db;
mod errors;
mod models;
mod predict;
mod retrain;
mod trainer;
mod weekly;

#[cfg(test)]
mod testutil;

use errors::TrackerError;

const DEMO_EMAIL: &str = "demo@tracker.local";

#[derive(Parser)]
#[command(name = "study-gap-tracker")]
#[command(about = "Daily habit tracker and study-hour gap predictor", long_about = None)]
struct Cli {
    /// Directory holding the log database and per-user artifacts
    #[arg(long, default_value = "tracker_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the log store schema
    InitDb,
    /// Insert realistic demo logs and warm the demo model
    Seed,
    /// Save one daily log entry and retrain in the background
    Log {
        #[arg(long)]
        email: String,
        #[arg(long)]
        current_grade: f64,
        #[arg(long)]
        target_grade: f64,
        #[arg(long)]
        study: f64,
        #[arg(long)]
        sleep: f64,
        #[arg(long)]
        physical: f64,
        #[arg(long)]
        leisure: f64,
    },
    /// Rebuild the dataset file from stored logs
    Materialize {
        #[arg(long)]
        email: String,
    },
    /// Fit and persist the long-horizon model
    Train {
        #[arg(long)]
        email: String,
    },
    /// Predict additional study hours from the persisted model
    Predict {
        #[arg(long)]
        email: String,
    },
    /// Predict from an ephemeral model over the last 7 days of logs
    PredictWeek {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("failed to create {}", cli.data_dir.display()))?;

    let store = db::LogStore::connect(&cli.data_dir.join("logs.db"))
        .await
        .context("failed to open the log store")?;
    let artifacts = dataset::ArtifactStore::new(&cli.data_dir)?;
    let seeds = Arc::new(dataset::SeedRegistry::builtin());
    let retrain = retrain::spawn_retrain_worker(store.clone(), artifacts.clone(), seeds.clone());

    match cli.command {
        Commands::InitDb => {
            store.init().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let key = models::user_key(DEMO_EMAIL);
            let inserted = db::seed_demo_logs(&store, &key).await?;
            println!("Inserted {inserted} demo logs for {DEMO_EMAIL}.");
            let outcome = retrain.enqueue(&key).await.unwrap_or_default();
            println!(
                "Dataset written: {}. Model trained: {}.",
                outcome.dataset_written, outcome.model_trained
            );
        }
        Commands::Log {
            email,
            current_grade,
            target_grade,
            study,
            sleep,
            physical,
            leisure,
        } => {
            let key = models::user_key(&email);
            let submission = models::LogSubmission {
                current_grade,
                target_grade,
                study,
                sleep,
                physical,
                leisure,
            };
            match db::save_log(&store, &retrain, &key, submission).await {
                Ok((date_key, ack)) => {
                    println!("Saved log {date_key} for {email}.");
                    // the write already succeeded; wait here so the process
                    // does not exit mid-retrain
                    match ack.await {
                        Ok(outcome) if outcome.model_trained => println!("Model retrained."),
                        Ok(_) => println!("Model not retrained yet (needs 3 valid logs)."),
                        Err(_) => println!("Background retrain did not report back."),
                    }
                }
                Err(e) => return report(e),
            }
        }
        Commands::Materialize { email } => {
            let key = models::user_key(&email);
            let written = dataset::materialize(&store, &artifacts, &seeds, &key).await?;
            if written {
                println!("Dataset rebuilt for {email}.");
            } else {
                println!("No logs or seed data for {email}; nothing written.");
            }
        }
        Commands::Train { email } => {
            let key = models::user_key(&email);
            let trained = trainer::train(&artifacts, &key)?;
            if trained {
                println!("Model trained for {email}.");
            } else {
                println!("Not enough valid data to train for {email}.");
            }
        }
        Commands::Predict { email } => {
            let key = models::user_key(&email);
            match predict::predict_long(&store, &artifacts, &seeds, &key).await {
                Ok(prediction) => {
                    println!("Predicted grade gap: {:.2}", prediction.predicted_grade_gap);
                    println!(
                        "Recommended additional study hours: {:.2}",
                        prediction.required_additional_study_hours
                    );
                    if let Some(message) = prediction.message {
                        println!("{message}");
                    }
                }
                Err(e) => return report(e),
            }
        }
        Commands::PredictWeek { email } => {
            let key = models::user_key(&email);
            match weekly::predict_week(&store, &key).await {
                Ok(prediction) => {
                    println!("Predicted weekly gap: {:.2}", prediction.predicted_gap_week);
                    println!("Required weekly study hours: {:.2}", prediction.required_hours_week);
                }
                Err(e) => return report(e),
            }
        }
    }

    Ok(())
}

/// Refusals print and exit cleanly so callers can retry later; everything
/// else propagates as a hard error.
fn report(e: TrackerError) -> anyhow::Result<()> {
    if e.is_refusal() {
        println!("Cannot complete request: {e}");
        Ok(())
    } else {
        Err(e.into())
    }
}
