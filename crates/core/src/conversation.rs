//! Conversation types: dialogue stages, turns and the per-call session

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::business::{BusinessProfile, FaqEntry};

/// Scripted dialogue stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Greeting spoken, nothing asked yet
    #[default]
    Greeting,
    /// Waiting for the caller's name
    GetName,
    /// Waiting for a callback number
    GetPhone,
    /// Waiting for the reason of the call
    GetReason,
    /// Open questions until the caller is done
    FollowUp,
    /// Terminal
    End,
}

/// Scripted forward transitions. `End` is reachable from every stage because a
/// goodbye or repeated silence terminates the call wherever it happens.
static STAGE_TRANSITIONS: Lazy<HashMap<Stage, &'static [Stage]>> = Lazy::new(|| {
    use Stage::*;
    let mut map = HashMap::new();
    map.insert(Greeting, &[GetName, End] as &[_]);
    map.insert(GetName, &[GetPhone, End] as &[_]);
    map.insert(GetPhone, &[GetReason, End] as &[_]);
    map.insert(GetReason, &[FollowUp, End] as &[_]);
    map.insert(FollowUp, &[FollowUp, End] as &[_]);
    map.insert(End, &[] as &[_]);
    map
});

impl Stage {
    /// Allowed transitions from this stage
    pub fn allowed_transitions(&self) -> &'static [Stage] {
        STAGE_TRANSITIONS.get(self).copied().unwrap_or(&[])
    }

    /// Check if a transition to `target` is allowed
    pub fn can_transition_to(&self, target: Stage) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Next stage of the scripted flow
    pub fn default_next(&self) -> Option<Stage> {
        match self {
            Stage::Greeting => Some(Stage::GetName),
            Stage::GetName => Some(Stage::GetPhone),
            Stage::GetPhone => Some(Stage::GetReason),
            Stage::GetReason => Some(Stage::FollowUp),
            Stage::FollowUp => Some(Stage::FollowUp),
            Stage::End => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::End)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Greeting => "greeting",
            Stage::GetName => "get_name",
            Stage::GetPhone => "get_phone",
            Stage::GetReason => "get_reason",
            Stage::FollowUp => "follow_up",
            Stage::End => "end",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The caller
    Caller,
    /// The assistant
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::Caller => "caller",
            TurnRole::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "assistant" => TurnRole::Assistant,
            _ => TurnRole::Caller,
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn caller(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Caller, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text)
    }
}

/// Fields the scripted flow tries to capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub reason: Option<String>,
}

impl CollectedInfo {
    /// True when nothing has been captured yet
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.reason.is_none()
    }

    /// True when a name or phone number was captured
    pub fn has_contact(&self) -> bool {
        self.name.is_some() || self.phone.is_some()
    }
}

/// Business context snapshot taken when the call starts, so a profile edit
/// mid-call does not change the script under the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessContext {
    pub business_name: String,
    pub faqs: Vec<FaqEntry>,
    pub services: Vec<String>,
    pub hours: Option<String>,
}

impl From<&BusinessProfile> for BusinessContext {
    fn from(profile: &BusinessProfile) -> Self {
        Self {
            business_name: profile.name.clone(),
            faqs: profile.faqs.clone(),
            services: profile.services.clone(),
            hours: profile.hours.clone(),
        }
    }
}

/// Mutable per-call dialogue state, alive for the duration of one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub call_id: String,
    pub business_id: String,
    pub call_record_id: String,
    pub caller_number: Option<String>,
    pub stage: Stage,
    pub collected: CollectedInfo,
    pub history: Vec<Turn>,
    /// Open questions asked during `GetReason` and `FollowUp`
    pub questions: Vec<String>,
    pub context: BusinessContext,
    pub no_input_count: u32,
    /// Language-model answers used so far
    pub question_count: u32,
    pub started_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(
        call_id: impl Into<String>,
        call_record_id: impl Into<String>,
        business: &BusinessProfile,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            business_id: business.id.clone(),
            call_record_id: call_record_id.into(),
            caller_number: None,
            stage: Stage::Greeting,
            collected: CollectedInfo::default(),
            history: Vec::new(),
            questions: Vec::new(),
            context: BusinessContext::from(business),
            no_input_count: 0,
            question_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn with_caller_number(mut self, number: impl Into<String>) -> Self {
        self.caller_number = Some(number.into());
        self
    }

    /// Last prompt the assistant spoke, if any
    pub fn last_prompt(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Assistant)
            .map(|t| t.text.as_str())
    }
}
