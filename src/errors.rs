use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("{0}")]
    Validation(String),

    #[error("not enough data: {have} rows, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("model not trained")]
    ModelUnavailable,

    #[error("no logs available")]
    NoLogs,

    #[error("invalid last log values")]
    InvalidLogValues,

    #[error("log store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("model load failed: {0}")]
    CorruptArtifact(String),

    #[error("model fit failed: {0}")]
    Fit(String),

    #[error("artifact encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("dataset error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Refusals are well-defined "no" answers the caller may retry after
    /// conditions change; everything else is a transient or hard failure.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            TrackerError::Validation(_)
                | TrackerError::InsufficientData { .. }
                | TrackerError::ModelUnavailable
                | TrackerError::NoLogs
                | TrackerError::InvalidLogValues
        )
    }
}
