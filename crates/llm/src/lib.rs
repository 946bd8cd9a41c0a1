//! LLM integration
//!
//! Features:
//! - OpenAI-compatible chat completions (hosted or local)
//! - Retry with exponential backoff for transient failures
//! - Shared message types for prompts

pub mod backend;
pub mod prompt;

pub use backend::{
    FinishReason, GenerationResult, LlmBackend, LlmConfig, OpenAIBackend, UnconfiguredBackend,
};
pub use prompt::{Message, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for call_assistant_core::Error {
    fn from(err: LlmError) -> Self {
        call_assistant_core::Error::Llm(err.to_string())
    }
}
