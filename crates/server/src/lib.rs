//! Call Assistant Server
//!
//! Telephony webhooks, health endpoints and Prometheus metrics for the
//! call assistant.

pub mod http;
pub mod metrics;
pub mod state;
pub mod twiml;
pub mod voice;

pub use crate::http::create_router;
pub use crate::metrics::{
    init_metrics, record_call_ended, record_call_started, record_llm_question,
    record_notification, record_pipeline_run, record_turn,
};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use call_assistant_persistence::PersistenceError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PersistenceError> for ServerError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(call_id) => ServerError::CallNotFound(call_id),
            other => ServerError::Persistence(other.to_string()),
        }
    }
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::CallNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Configuration(_)
            | ServerError::Persistence(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
