//! Engine Error Types
//!
//! Invocation-level error type for the engine crate. Extends the core error
//! set with LLM failures and cancellation. Expected tool failures never
//! appear here; they travel back to the model as tool output text.

use tabletalk_core::CoreError;
use tabletalk_llm::LlmError;
use thiserror::Error;

/// Fatal error for one engine invocation.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// LLM provider failure or malformed structured output
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The client disconnected or the caller cancelled; not surfaced as an
    /// error event.
    #[error("invocation cancelled")]
    Cancelled,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias for engine operations
pub type AppResult<T> = Result<T, AppError>;
