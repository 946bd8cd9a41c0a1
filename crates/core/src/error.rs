//! Shared error type

use thiserror::Error;

/// Errors shared across the call assistant crates
#[derive(Error, Debug)]
pub enum Error {
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Business not found: {0}")]
    BusinessNotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias using the shared [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
