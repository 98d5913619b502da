use thiserror::Error;

/// Core error types for medical-office visit operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown visit stage: {0}")]
    UnknownStage(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl CoreError {
    /// Create a new UnknownStage error
    pub fn unknown_stage(stage: impl Into<String>) -> Self {
        Self::UnknownStage(stage.into())
    }

    /// Create a new InvalidTimestamp error
    pub fn invalid_timestamp(message: impl Into<String>) -> Self {
        Self::InvalidTimestamp(message.into())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
