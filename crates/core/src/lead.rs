//! Lead captured from a finished call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::conversation::Turn;
use crate::phone;

/// Lead quality tier. Declaration order is the ranking:
/// `Cold < Unknown < Warm < Hot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Cold,
    #[default]
    Unknown,
    Warm,
    Hot,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Unknown => "unknown",
            Self::Warm => "warm",
            Self::Hot => "hot",
        }
    }

    /// Lenient parse for model output; anything unrecognised is `Unknown`
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "cold" | "low" => Self::Cold,
            "warm" | "medium" => Self::Warm,
            "hot" | "high" => Self::Hot,
            _ => Self::Unknown,
        }
    }

    /// Higher of the two tiers
    pub fn upgrade(self, other: QualityTier) -> QualityTier {
        self.max(other)
    }
}

/// Outcome status of the summary adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// AI summary attached to a lead
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiSummary {
    pub text: Option<String>,
    pub status: SummaryStatus,
    #[serde(default)]
    pub model: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

/// Delivery status of a lead notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Failed,
    /// Notifications disabled for the business
    Skipped,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Notification state, always written once dispatch was attempted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub recipients: Vec<String>,
}

impl NotificationRecord {
    pub fn sent(recipients: Vec<String>) -> Self {
        Self {
            status: NotificationStatus::Sent,
            sent_at: Some(Utc::now()),
            error: None,
            recipients,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: NotificationStatus::Failed,
            sent_at: None,
            error: Some(error.into()),
            recipients: Vec::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: NotificationStatus::Skipped,
            sent_at: None,
            error: Some(reason.into()),
            recipients: Vec::new(),
        }
    }
}

/// Lead fields pulled out of a free-form transcript by the language model,
/// validated before they touch a [`Lead`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedLeadInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub reason: Option<String>,
    pub services: Vec<String>,
    pub questions: Vec<String>,
    pub quality: QualityTier,
}

const MAX_NAME_CHARS: usize = 80;
const MAX_REASON_CHARS: usize = 500;

impl ExtractedLeadInfo {
    /// Find the first JSON object in model output and coerce it.
    /// Returns `None` when no object can be parsed.
    pub fn parse_model_output(text: &str) -> Option<Self> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end <= start {
            return None;
        }
        let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
        value.is_object().then(|| Self::from_value(&value))
    }

    /// Coerce an arbitrary JSON object: wrong types are dropped, placeholder
    /// strings ("unknown", "n/a") become `None`, phone numbers must be phone-like.
    pub fn from_value(value: &Value) -> Self {
        let name = clean_string(value.get("name"), MAX_NAME_CHARS);
        let phone = clean_string(value.get("phone"), 32).filter(|p| phone::is_phone_like(p));
        let reason = clean_string(value.get("reason"), MAX_REASON_CHARS);
        let quality = value
            .get("quality")
            .and_then(Value::as_str)
            .map(QualityTier::parse_lenient)
            .unwrap_or_default();

        Self {
            name,
            phone,
            reason,
            services: clean_list(value.get("services")),
            questions: clean_list(value.get("questions")),
            quality,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.reason.is_none()
    }
}

fn clean_string(value: Option<&Value>, max_chars: usize) -> Option<String> {
    let s = value?.as_str()?.trim();
    let lowered = s.to_ascii_lowercase();
    if s.is_empty() || matches!(lowered.as_str(), "unknown" | "unclear" | "n/a" | "none" | "null") {
        return None;
    }
    Some(s.chars().take(max_chars).collect())
}

fn clean_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| clean_string(Some(v), MAX_REASON_CHARS))
                .collect()
        })
        .unwrap_or_default()
}

/// Lead record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub business_id: String,
    /// Call that created the lead
    pub source_call_id: String,
    /// Every call merged into this lead, oldest first
    pub call_ids: Vec<String>,
    pub phone: String,
    /// Last 10 digits of `phone`
    pub phone_key: String,
    pub name: Option<String>,
    pub reason: Option<String>,
    pub services: Vec<String>,
    pub questions: Vec<String>,
    pub transcript: Vec<Turn>,
    pub quality: QualityTier,
    pub ai_summary: AiSummary,
    pub notification: Option<NotificationRecord>,
    pub follow_up_notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// New lead for `call_id`. Fails when `phone` is not phone-like.
    pub fn new(
        business_id: impl Into<String>,
        call_id: impl Into<String>,
        phone: impl Into<String>,
    ) -> crate::Result<Self> {
        let phone = phone.into();
        let phone_key = phone::phone_key(&phone)
            .ok_or_else(|| crate::Error::InvalidData(format!("not a phone number: {phone}")))?;
        let call_id = call_id.into();
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            business_id: business_id.into(),
            source_call_id: call_id.clone(),
            call_ids: vec![call_id],
            phone,
            phone_key,
            name: None,
            reason: None,
            services: Vec::new(),
            questions: Vec::new(),
            transcript: Vec::new(),
            quality: QualityTier::Unknown,
            ai_summary: AiSummary::default(),
            notification: None,
            follow_up_notes: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fold a lead built from a later call into this one: union of services and
    /// questions, the higher quality tier, a follow-up note, fresher name/reason
    /// and transcript. Identity (id, phone, creation time) is kept.
    pub fn absorb(&mut self, incoming: &Lead) {
        if self.call_ids.contains(&incoming.source_call_id) {
            return;
        }
        union_into(&mut self.services, &incoming.services);
        union_into(&mut self.questions, &incoming.questions);
        self.quality = self.quality.upgrade(incoming.quality);
        if self.name.is_none() {
            self.name = incoming.name.clone();
        }
        if incoming.reason.is_some() {
            self.reason = incoming.reason.clone();
        }
        if !incoming.transcript.is_empty() {
            self.transcript = incoming.transcript.clone();
        }
        self.follow_up_notes.push(format!(
            "Called again on {}: {}",
            incoming.created_at.format("%Y-%m-%d %H:%M UTC"),
            incoming.reason.as_deref().unwrap_or("no reason given")
        ));
        self.call_ids.push(incoming.source_call_id.clone());
        self.updated_at = Utc::now();
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown caller")
    }
}

/// Case-insensitive ordered union
fn union_into(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        let exists = target.iter().any(|t| t.eq_ignore_ascii_case(item));
        if !exists {
            target.push(item.clone());
        }
    }
}
