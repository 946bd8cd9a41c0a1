//! HTTP Endpoints
//!
//! Gateway webhooks plus health, readiness and metrics.

use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::voice;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.timeout_seconds);

    Router::new()
        // Telephony gateway
        .route("/voice/incoming", post(voice::incoming_call))
        .route(voice::GATHER_PATH, post(voice::gather))
        .route("/voice/status", post(voice::call_status))
        .route("/voice/recording", post(voice::recording))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness: the process is up and serving
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.storage.as_str(),
        "active_calls": state.sessions.len(),
    }))
}

/// Readiness: a default business can take calls. The completion service
/// is reported but does not gate readiness, since calls degrade to
/// deflection without it.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let mut checks = serde_json::Map::new();
    let mut ready = true;

    let fallback = state.businesses.default_business();
    if fallback.is_none() {
        ready = false;
    }
    checks.insert(
        "businesses".to_string(),
        serde_json::json!({
            "status": if fallback.is_some() { "ok" } else { "missing" },
            "default": fallback.map(|b| b.id),
        }),
    );

    checks.insert(
        "storage".to_string(),
        serde_json::json!({ "status": "ok", "backend": state.storage.as_str() }),
    );

    let llm_status =
        match tokio::time::timeout(Duration::from_secs(2), state.llm.is_available()).await {
            Ok(true) => "ok",
            Ok(false) => "unreachable",
            Err(_) => "timeout",
        };
    checks.insert(
        "llm".to_string(),
        serde_json::json!({ "status": llm_status, "model": state.llm.model_name() }),
    );

    let status = match (ready, llm_status) {
        (false, _) => "not_ready",
        (true, "ok") => "ready",
        (true, _) => "degraded",
    };
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": status,
            "checks": checks
        })),
    )
}
