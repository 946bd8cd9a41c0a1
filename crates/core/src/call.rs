//! Durable call record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::{Turn, TurnRole};
use crate::lead::NotificationRecord;

/// Call lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    Ringing,
    #[default]
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Ringing => "ringing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Busy => "busy",
            Self::Failed => "failed",
            Self::NoAnswer => "no_answer",
            Self::Canceled => "canceled",
        }
    }

    /// Parse both the stored form and the gateway's hyphenated form
    /// (`in-progress`, `no-answer`). Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "queued" | "initiated" => Some(Self::Queued),
            "ringing" => Some(Self::Ringing),
            "in_progress" | "answered" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "busy" => Some(Self::Busy),
            "failed" => Some(Self::Failed),
            "no_answer" => Some(Self::NoAnswer),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// The call is over from the gateway's side
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Busy | Self::Failed | Self::NoAnswer | Self::Canceled
        )
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    #[default]
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Gateway directions look like `inbound`, `outbound-api`, `outbound-dial`
    pub fn from_str(s: &str) -> Self {
        if s.trim().to_ascii_lowercase().starts_with("outbound") {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }
}

/// Recording reference delivered after the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingRef {
    pub url: String,
    #[serde(default)]
    pub recording_id: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
}

/// Values written by the one finalization of a call
#[derive(Debug, Clone)]
pub struct Finalization {
    pub status: CallStatus,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: u32,
    pub summary: String,
}

/// Durable record of one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub business_id: String,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<u32>,
    /// Append-only
    pub transcript: Vec<Turn>,
    pub conversation_summary: Option<String>,
    pub lead_captured: bool,
    pub lead_id: Option<Uuid>,
    pub notification: Option<NotificationRecord>,
    pub recording: Option<RecordingRef>,
}

impl CallRecord {
    pub fn new(call_id: impl Into<String>, business_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            business_id: business_id.into(),
            from_number: None,
            to_number: None,
            direction: CallDirection::Inbound,
            status: CallStatus::InProgress,
            started_at: Utc::now(),
            ended_at: None,
            duration_secs: None,
            transcript: Vec::new(),
            conversation_summary: None,
            lead_captured: false,
            lead_id: None,
            notification: None,
            recording: None,
        }
    }

    pub fn with_numbers(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.from_number = from;
        self.to_number = to;
        self
    }

    pub fn with_direction(mut self, direction: CallDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Finalization guard: terminal status and a conversation summary
    pub fn is_finalized(&self) -> bool {
        self.status.is_terminal() && self.conversation_summary.is_some()
    }

    /// Duration to record at finalization: the gateway's figure when it
    /// reported one, otherwise wall-clock time since the call started.
    pub fn resolve_duration(&self, now: DateTime<Utc>) -> u32 {
        self.duration_secs
            .unwrap_or_else(|| (now - self.started_at).num_seconds().max(0) as u32)
    }

    /// Whether the caller said anything at all
    pub fn has_caller_speech(&self) -> bool {
        self.transcript
            .iter()
            .any(|t| t.role == TurnRole::Caller && !t.text.trim().is_empty())
    }
}

/// Render turns as `Caller: ...` / `Assistant: ...` lines
pub fn format_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let speaker = match t.role {
                TurnRole::Caller => "Caller",
                TurnRole::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
