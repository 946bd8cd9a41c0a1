//! Call completion
//!
//! Turns a finished conversation into durable results:
//! - Lead capture with per-call ownership and phone de-duplication
//! - Labeled conversation summary, with a deterministic fallback
//! - Lead notification email to the business
//! - One-time finalization of the call record

pub mod lead_capture;
pub mod notify;
pub mod pipeline;
pub mod quality;
pub mod summary;

pub use lead_capture::{LeadCaptureService, LeadExtractor, LlmLeadExtractor};
pub use notify::{
    build_transport, EmailMessage, EmailTransport, HttpEmailTransport, LogEmailTransport,
    NotificationDispatcher,
};
pub use pipeline::{CallCompletionPipeline, CompletionReport, CompletionTrigger};
pub use quality::classify_quality;
pub use summary::{fallback_summary, LlmSummaryService, SummaryRequest, SummaryService};

use call_assistant_llm::LlmError;
use call_assistant_persistence::PersistenceError;
use thiserror::Error;

/// Completion errors
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Storage error: {0}")]
    Storage(#[from] PersistenceError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Invalid lead: {0}")]
    InvalidLead(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<call_assistant_core::Error> for CompletionError {
    fn from(err: call_assistant_core::Error) -> Self {
        CompletionError::InvalidLead(err.to_string())
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        CompletionError::Notification(err.to_string())
    }
}

impl From<CompletionError> for call_assistant_core::Error {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Storage(e) => e.into(),
            CompletionError::Llm(e) => call_assistant_core::Error::Llm(e.to_string()),
            CompletionError::Notification(msg) => call_assistant_core::Error::Notification(msg),
            other => call_assistant_core::Error::InvalidData(other.to_string()),
        }
    }
}
