use thiserror::Error;

use crate::tensor::device::Device;

/// Every failure the epoch runner and its collaborators can report.
///
/// None of these are recovered inside an epoch: a failing batch aborts the
/// whole pass and the caller resumes from the last completed epoch.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Placement or construction problem (missing process group, bad device list).
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Device mismatch: expected {expected}, found {found}")]
    DeviceMismatch { expected: Device, found: Device },

    /// A `Task` hook was invoked without a concrete implementation.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Batch is missing required field `{0}`")]
    MissingField(String),

    #[error("Loss did not report declared component `{0}`")]
    LossStat(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Collective operation failed: {0}")]
    Collective(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrainError>;
