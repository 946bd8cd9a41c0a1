//! Conversation summaries
//!
//! Summaries always come out in the same labeled shape so they read the same
//! in the call record, the lead and the notification email:
//!
//! ```text
//! Caller: Sam Jones
//! Phone: 5551234567
//! Intent: Kitchen sink is leaking
//! Urgency: high
//! Next step: Call back at 5551234567
//! Notes: Asked about weekend hours
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use call_assistant_core::{
    format_transcript, AiSummary, CollectedInfo, QualityTier, SummaryStatus, Turn,
};
use call_assistant_llm::{LlmBackend, Message};

use crate::quality::classify_quality;

/// Labels, in output order
pub const SUMMARY_LABELS: [&str; 6] = ["Caller", "Phone", "Intent", "Urgency", "Next step", "Notes"];

const UNCLEAR: &str = "unclear";

/// Everything known about a finished call
#[derive(Debug, Clone, Default)]
pub struct SummaryRequest {
    pub business_name: String,
    pub transcript: Vec<Turn>,
    pub collected: CollectedInfo,
    /// Gateway caller-ID
    pub caller_number: Option<String>,
    pub questions: Vec<String>,
}

impl SummaryRequest {
    fn phone(&self) -> Option<&str> {
        self.collected
            .phone
            .as_deref()
            .or(self.caller_number.as_deref())
    }
}

/// Produces the summary attached to a call and its lead. Never fails: a
/// broken adapter reports `status: failed` with the error instead.
#[async_trait]
pub trait SummaryService: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> AiSummary;
}

fn urgency(tier: QualityTier) -> &'static str {
    match tier {
        QualityTier::Hot => "high",
        QualityTier::Warm => "medium",
        QualityTier::Cold => "low",
        QualityTier::Unknown => UNCLEAR,
    }
}

fn render(fields: &[Option<String>; 6]) -> String {
    SUMMARY_LABELS
        .iter()
        .zip(fields.iter())
        .map(|(label, value)| format!("{}: {}", label, value.as_deref().unwrap_or(UNCLEAR)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic summary from the collected fields alone
pub fn fallback_summary(request: &SummaryRequest) -> String {
    let collected = &request.collected;
    let phone = request.phone().map(str::to_string);
    let tier = classify_quality(collected.reason.as_deref(), &request.questions);

    let next_step = match &phone {
        Some(phone) => format!("Call back at {}", phone),
        None => "Review the call transcript".to_string(),
    };
    let notes = (!request.questions.is_empty()).then(|| {
        format!("Asked: {}", request.questions.join("; "))
    });

    render(&[
        collected.name.clone(),
        phone,
        collected.reason.clone(),
        Some(urgency(tier).to_string()),
        Some(next_step),
        notes,
    ])
}

/// Force model output into the labeled layout. Unrecognized lines are
/// kept as notes; missing labels read "unclear".
pub fn coerce_labeled(text: &str) -> Option<String> {
    let mut fields: [Option<String>; 6] = Default::default();
    let mut stray = Vec::new();

    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', '•']).trim();
        if line.is_empty() {
            continue;
        }
        let parsed = line.split_once(':').and_then(|(label, value)| {
            let label = label.trim().trim_matches('*').trim();
            SUMMARY_LABELS
                .iter()
                .position(|l| l.eq_ignore_ascii_case(label))
                .map(|idx| (idx, value.trim().trim_matches('*').trim()))
        });
        match parsed {
            Some((idx, value)) => {
                let empty = value.is_empty() || value.eq_ignore_ascii_case(UNCLEAR);
                if !empty && fields[idx].is_none() {
                    fields[idx] = Some(value.to_string());
                }
            }
            None => stray.push(line.to_string()),
        }
    }

    if fields.iter().all(Option::is_none) && stray.is_empty() {
        return None;
    }

    if !stray.is_empty() {
        let extra = stray.join(" ");
        fields[5] = Some(match fields[5].take() {
            Some(notes) => format!("{} {}", notes, extra),
            None => extra,
        });
    }

    Some(render(&fields))
}

/// [`SummaryService`] backed by the completion service
pub struct LlmSummaryService {
    backend: Arc<dyn LlmBackend>,
}

impl LlmSummaryService {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    fn messages(request: &SummaryRequest) -> Vec<Message> {
        let system = format!(
            "You summarize phone calls answered for {}. Reply with exactly six lines in this \
             order and nothing else:\nCaller: <name>\nPhone: <callback number>\nIntent: <why \
             they called>\nUrgency: <high, medium or low>\nNext step: <what the team should \
             do>\nNotes: <anything else worth knowing>\nWrite \"unclear\" for anything the call \
             does not say.",
            request.business_name
        );

        let mut known = Vec::new();
        if let Some(name) = &request.collected.name {
            known.push(format!("name = {}", name));
        }
        if let Some(phone) = request.phone() {
            known.push(format!("phone = {}", phone));
        }
        if let Some(reason) = &request.collected.reason {
            known.push(format!("reason = {}", reason));
        }

        let mut user = String::new();
        if !known.is_empty() {
            user.push_str(&format!("Known fields: {}\n\n", known.join(", ")));
        }
        user.push_str("Transcript:\n");
        user.push_str(&format_transcript(&request.transcript));

        vec![Message::system(system), Message::user(user)]
    }
}

#[async_trait]
impl SummaryService for LlmSummaryService {
    async fn summarize(&self, request: &SummaryRequest) -> AiSummary {
        let model = Some(self.backend.model_name().to_string());

        let failed = |error: String| AiSummary {
            text: None,
            status: SummaryStatus::Failed,
            model: model.clone(),
            error: Some(error),
            generated_at: Some(Utc::now()),
        };

        match self.backend.generate(&Self::messages(request)).await {
            Ok(result) => match coerce_labeled(&result.text) {
                Some(text) => AiSummary {
                    text: Some(text),
                    status: SummaryStatus::Success,
                    model: model.clone(),
                    error: None,
                    generated_at: Some(Utc::now()),
                },
                None => failed("empty summary".to_string()),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Summary generation failed");
                failed(e.to_string())
            }
        }
    }
}
