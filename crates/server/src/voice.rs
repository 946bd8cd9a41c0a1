//! Telephony webhooks
//!
//! Form-encoded callbacks from the gateway. Dialogue faults never surface
//! as HTTP errors on the call path: the caller always hears something.

use std::time::Instant;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use serde::Deserialize;

use call_assistant_completion::CompletionTrigger;
use call_assistant_core::{CallDirection, CallRecord, CallStatus, RecordingRef};

use crate::metrics;
use crate::state::AppState;
use crate::twiml::{self, Twiml};
use crate::ServerError;

pub const GATHER_PATH: &str = "/voice/gather";

const NOT_IN_SERVICE: &str =
    "Sorry, this number is not set up to take calls right now. Goodbye.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IncomingCallForm {
    pub call_sid: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatherForm {
    pub call_sid: String,
    #[serde(default)]
    pub speech_result: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusForm {
    pub call_sid: String,
    pub call_status: String,
    #[serde(default)]
    pub call_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingForm {
    pub call_sid: String,
    pub recording_url: String,
    #[serde(default)]
    pub recording_sid: Option<String>,
    #[serde(default)]
    pub recording_duration: Option<String>,
}

/// Gateway numbers arrive as strings and may be blank
fn parse_field<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `POST /voice/incoming`
pub async fn incoming_call(
    State(state): State<AppState>,
    Form(form): Form<IncomingCallForm>,
) -> Twiml {
    let call_id = form.call_sid;
    let from = non_blank(form.from);
    let to = non_blank(form.to);

    let Some(business) = state.businesses.resolve(to.as_deref()) else {
        tracing::warn!(call_id = %call_id, to = ?to, "No business for dialed number");
        return Twiml(twiml::hangup(NOT_IN_SERVICE, state.voice()));
    };

    let direction = form
        .direction
        .as_deref()
        .map(CallDirection::from_str)
        .unwrap_or_default();
    let record = CallRecord::new(&call_id, &business.id)
        .with_numbers(from.clone(), to)
        .with_direction(direction);

    match state.calls.create(&record).await {
        Ok(true) => metrics::record_call_started(&business.id),
        Ok(false) => tracing::debug!(call_id = %call_id, "Call record already exists"),
        Err(e) => {
            tracing::error!(call_id = %call_id, error = %e, "Failed to create call record")
        }
    }

    let outcome = state
        .machine
        .start_call(&call_id, &business, from.as_deref())
        .await;

    if let Some(reason) = outcome.end_reason {
        metrics::record_call_ended(reason);
        spawn_completion(&state, call_id.clone(), CompletionTrigger::DialogueEnded);
    }

    Twiml(twiml::from_outcome(
        &outcome,
        &state.callback_url(GATHER_PATH),
        state.voice(),
    ))
}

/// `POST /voice/gather`
pub async fn gather(State(state): State<AppState>, Form(form): Form<GatherForm>) -> Twiml {
    let started = Instant::now();
    let utterance = form.speech_result.unwrap_or_default();
    let confidence = parse_field::<f32>(form.confidence.as_deref());

    let outcome = state
        .machine
        .handle_turn(&form.call_sid, &utterance, confidence)
        .await;

    metrics::record_turn(outcome.stage, started.elapsed().as_secs_f64());
    if outcome.llm_attempted {
        metrics::record_llm_question();
    }

    if let Some(reason) = outcome.end_reason {
        metrics::record_call_ended(reason);
        spawn_completion(&state, form.call_sid.clone(), CompletionTrigger::DialogueEnded);
    }

    Twiml(twiml::from_outcome(
        &outcome,
        &state.callback_url(GATHER_PATH),
        state.voice(),
    ))
}

/// `POST /voice/status`
pub async fn call_status(
    State(state): State<AppState>,
    Form(form): Form<StatusForm>,
) -> Result<StatusCode, ServerError> {
    let status = CallStatus::parse(&form.call_status).ok_or_else(|| {
        ServerError::InvalidRequest(format!("unknown call status '{}'", form.call_status))
    })?;
    let duration = parse_field::<u32>(form.call_duration.as_deref());

    tracing::info!(
        call_id = %form.call_sid,
        status = status.as_str(),
        duration_secs = ?duration,
        "Call status update"
    );

    if let Err(e) = state
        .calls
        .update_status(&form.call_sid, status, duration)
        .await
    {
        tracing::warn!(call_id = %form.call_sid, error = %e, "Failed to update call status");
    }

    if status.is_terminal() {
        spawn_completion(
            &state,
            form.call_sid,
            CompletionTrigger::GatewayStatus {
                status,
                duration_secs: duration,
            },
        );
    }

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /voice/recording`
pub async fn recording(
    State(state): State<AppState>,
    Form(form): Form<RecordingForm>,
) -> Result<StatusCode, ServerError> {
    if form.recording_url.trim().is_empty() {
        return Err(ServerError::InvalidRequest("empty RecordingUrl".into()));
    }

    let recording = RecordingRef {
        url: form.recording_url,
        recording_id: non_blank(form.recording_sid),
        duration_secs: parse_field(form.recording_duration.as_deref()),
    };
    state
        .calls
        .attach_recording(&form.call_sid, &recording)
        .await?;

    tracing::info!(call_id = %form.call_sid, url = %recording.url, "Recording attached");
    Ok(StatusCode::NO_CONTENT)
}

/// Run the completion pipeline in the background; the webhook answers
/// without waiting for summary or email
fn spawn_completion(state: &AppState, call_id: String, trigger: CompletionTrigger) {
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        let report = pipeline.run(&call_id, trigger).await;
        metrics::record_pipeline_run(trigger, &report);
    });
}
