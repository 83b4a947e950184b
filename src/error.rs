//! Error types for the reCAPTCHA native engine

use thiserror::Error;

/// Errors that can occur while driving a verification session
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Malformed arguments: {0}")]
    MalformedArguments(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl EngineError {
    /// Stable error code reported in method-channel error envelopes
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidState(_) => "INVALID_STATE",
            EngineError::MalformedArguments(_) | EngineError::JsonError(_) => {
                "MALFORMED_ARGUMENTS"
            }
            EngineError::ConfigError(_) => "INTERNAL_ERROR",
        }
    }
}
