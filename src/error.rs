use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Required input not found at {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Setting {key} is invalid ({reason}; value: {value})")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unrecognized date value: {0}")]
    InvalidDate(String),
}
