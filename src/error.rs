use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("language model rejected the request: {0}")]
    ModelRejected(String),
    #[error("could not read the model response: {reason}")]
    Normalization { reason: String, raw: String },
    #[error("tracker capability probe failed: {0}")]
    TrackerCapability(String),
    #[error("issue creation failed: {0}")]
    TrackerCreation(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn normalization(reason: impl Into<String>, raw: &str) -> Self {
        AppError::Normalization {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    /// Only transport-level model failures are worth a caller-side retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ModelUnavailable(_))
    }

    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AppError::Normalization { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
