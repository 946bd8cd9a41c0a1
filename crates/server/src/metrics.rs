//! Prometheus metrics
//!
//! The recorder is installed once at startup; handlers record through the
//! `metrics` facade and `/metrics` renders the exposition text.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use call_assistant_agent::EndReason;
use call_assistant_completion::{CompletionReport, CompletionTrigger};
use call_assistant_core::{NotificationStatus, Stage};

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Returns `None` when a recorder was
/// already installed by someone else.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS.get() {
        return Some(handle.clone());
    }

    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            return None;
        }
    };

    describe_counter!("call_assistant_calls_started_total", "Calls answered");
    describe_counter!("call_assistant_turns_total", "Dialogue turns by resulting stage");
    describe_counter!("call_assistant_calls_ended_total", "Calls ended by the assistant, by reason");
    describe_counter!(
        "call_assistant_llm_questions_total",
        "Open questions sent to the completion service"
    );
    describe_counter!(
        "call_assistant_pipeline_runs_total",
        "Call completion runs by trigger and outcome"
    );
    describe_counter!(
        "call_assistant_notifications_total",
        "Lead notifications by delivery status"
    );
    describe_histogram!(
        "call_assistant_turn_duration_seconds",
        "Time spent producing the reply to one turn"
    );

    let _ = PROMETHEUS.set(handle.clone());
    Some(handle)
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}

pub fn record_call_started(business_id: &str) {
    counter!("call_assistant_calls_started_total", "business" => business_id.to_string())
        .increment(1);
}

pub fn record_turn(stage: Stage, seconds: f64) {
    counter!("call_assistant_turns_total", "stage" => stage.as_str()).increment(1);
    histogram!("call_assistant_turn_duration_seconds").record(seconds);
}

pub fn record_call_ended(reason: EndReason) {
    counter!("call_assistant_calls_ended_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_llm_question() {
    counter!("call_assistant_llm_questions_total").increment(1);
}

pub fn record_pipeline_run(trigger: CompletionTrigger, report: &CompletionReport) {
    counter!(
        "call_assistant_pipeline_runs_total",
        "trigger" => trigger.as_str(),
        "outcome" => report.as_str()
    )
    .increment(1);

    if let CompletionReport::Finalized {
        notification: Some(status),
        ..
    } = report
    {
        record_notification(*status);
    }
}

pub fn record_notification(status: NotificationStatus) {
    counter!("call_assistant_notifications_total", "status" => status.as_str()).increment(1);
}
