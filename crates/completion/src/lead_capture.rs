//! Lead capture
//!
//! One lead per call, and one lead per phone number within a business:
//! a repeat caller is merged into the lead that already owns the number.
//! The call identifier is claimed before anything is written, so duplicate
//! or concurrent runs for the same call converge on the same lead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use call_assistant_core::{
    format_transcript, is_phone_like, BusinessProfile, CallRecord, CollectedInfo,
    ExtractedLeadInfo, Lead, Turn,
};
use call_assistant_llm::{LlmBackend, Message};
use call_assistant_persistence::{CallClaim, LeadStore};

use crate::quality::classify_quality;
use crate::CompletionError;

/// Attempts to read a lead written by the run that won the call claim
const WINNER_READ_ATTEMPTS: u32 = 5;
const WINNER_READ_DELAY: Duration = Duration::from_millis(40);

/// Pulls lead fields out of a transcript when the scripted dialogue
/// collected nothing
#[async_trait]
pub trait LeadExtractor: Send + Sync {
    async fn extract(
        &self,
        business: &BusinessProfile,
        transcript: &[Turn],
    ) -> Result<ExtractedLeadInfo, CompletionError>;
}

/// [`LeadExtractor`] asking the completion service for a JSON object
pub struct LlmLeadExtractor {
    backend: Arc<dyn LlmBackend>,
}

impl LlmLeadExtractor {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl LeadExtractor for LlmLeadExtractor {
    async fn extract(
        &self,
        business: &BusinessProfile,
        transcript: &[Turn],
    ) -> Result<ExtractedLeadInfo, CompletionError> {
        let system = format!(
            "Extract lead details from a phone call to {}. Respond with one JSON object and \
             nothing else, using the keys \"name\", \"phone\", \"reason\", \"services\" (array \
             of strings), \"questions\" (array of strings) and \"quality\" (one of \"hot\", \
             \"warm\", \"cold\", \"unknown\"). Use null for anything the caller did not say.",
            business.name
        );
        let messages = vec![
            Message::system(system),
            Message::user(format_transcript(transcript)),
        ];

        let result = self.backend.generate(&messages).await?;
        ExtractedLeadInfo::parse_model_output(&result.text)
            .ok_or_else(|| CompletionError::Extraction("no JSON object in model output".into()))
    }
}

/// Creates or merges the lead for a finished call
pub struct LeadCaptureService {
    leads: Arc<dyn LeadStore>,
    extractor: Option<Arc<dyn LeadExtractor>>,
}

impl LeadCaptureService {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self {
            leads,
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn LeadExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn leads(&self) -> &Arc<dyn LeadStore> {
        &self.leads
    }

    /// Capture the lead for `record`. Returns `None` when no callback number
    /// could be determined.
    pub async fn capture(
        &self,
        record: &CallRecord,
        business: &BusinessProfile,
        collected: &CollectedInfo,
        questions: &[String],
    ) -> Result<Option<Lead>, CompletionError> {
        let call_id = record.call_id.as_str();

        if let Some(existing) = self.leads.find_by_call(&business.id, call_id).await? {
            tracing::debug!(call_id = %call_id, lead_id = %existing.id, "Lead already captured");
            return Ok(Some(existing));
        }

        let info = self.resolve_fields(record, business, collected, questions).await;

        let phone = info
            .phone
            .clone()
            .filter(|p| is_phone_like(p))
            .or_else(|| record.from_number.clone().filter(|p| is_phone_like(p)));
        let Some(phone) = phone else {
            tracing::info!(call_id = %call_id, "No callback number, not creating a lead");
            return Ok(None);
        };

        let mut incoming = Lead::new(&business.id, call_id, phone)?;
        incoming.name = info.name;
        incoming.reason = info.reason;
        incoming.services = info.services;
        incoming.questions = info.questions;
        incoming.quality = info.quality;
        incoming.transcript = record.transcript.clone();

        let lead = match self
            .leads
            .find_by_phone(&business.id, &incoming.phone_key)
            .await?
        {
            Some(mut existing) => {
                tracing::info!(
                    call_id = %call_id,
                    lead_id = %existing.id,
                    "Repeat caller, merging into existing lead"
                );
                existing.absorb(&incoming);
                existing
            }
            None => incoming,
        };

        match self.leads.claim_call(&business.id, call_id, lead.id).await? {
            CallClaim::Claimed => {
                self.leads.save(&lead).await?;
                tracing::info!(
                    call_id = %call_id,
                    lead_id = %lead.id,
                    quality = lead.quality.as_str(),
                    "Lead captured"
                );
                Ok(Some(lead))
            }
            CallClaim::AlreadyClaimed(winner) => {
                tracing::debug!(call_id = %call_id, lead_id = %winner, "Call claimed by another run");
                self.read_winner(winner).await
            }
        }
    }

    /// The winning run saves right after claiming; give it a moment
    async fn read_winner(&self, lead_id: uuid::Uuid) -> Result<Option<Lead>, CompletionError> {
        for attempt in 0..WINNER_READ_ATTEMPTS {
            if let Some(lead) = self.leads.get(lead_id).await? {
                return Ok(Some(lead));
            }
            if attempt + 1 < WINNER_READ_ATTEMPTS {
                tokio::time::sleep(WINNER_READ_DELAY).await;
            }
        }
        tracing::warn!(lead_id = %lead_id, "Claimed lead not yet visible");
        Ok(None)
    }

    /// Collected fields first; model extraction only when the dialogue
    /// collected nothing
    async fn resolve_fields(
        &self,
        record: &CallRecord,
        business: &BusinessProfile,
        collected: &CollectedInfo,
        questions: &[String],
    ) -> ExtractedLeadInfo {
        if !collected.is_empty() {
            return ExtractedLeadInfo {
                name: collected.name.clone(),
                phone: collected.phone.clone(),
                reason: collected.reason.clone(),
                services: mentioned_services(business, collected.reason.as_deref(), questions),
                questions: questions.to_vec(),
                quality: classify_quality(collected.reason.as_deref(), questions),
            };
        }

        let Some(extractor) = &self.extractor else {
            return ExtractedLeadInfo::default();
        };
        if !record.has_caller_speech() {
            return ExtractedLeadInfo::default();
        }

        match extractor.extract(business, &record.transcript).await {
            Ok(info) => {
                tracing::debug!(call_id = %record.call_id, empty = info.is_empty(), "Extracted lead fields from transcript");
                info
            }
            Err(e) => {
                tracing::warn!(call_id = %record.call_id, error = %e, "Lead extraction failed");
                ExtractedLeadInfo::default()
            }
        }
    }
}

/// Business services the caller mentioned
fn mentioned_services(
    business: &BusinessProfile,
    reason: Option<&str>,
    questions: &[String],
) -> Vec<String> {
    let mut text = reason.unwrap_or_default().to_lowercase();
    for question in questions {
        text.push(' ');
        text.push_str(&question.to_lowercase());
    }

    business
        .services
        .iter()
        .filter(|service| {
            let service = service.to_lowercase();
            !service.is_empty() && text.contains(&service)
        })
        .cloned()
        .collect()
}
