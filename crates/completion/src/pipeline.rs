//! Call completion pipeline
//!
//! Runs when the dialogue ends a call and again when the gateway reports a
//! terminal status. Whichever run gets there first does the work; the
//! conditional finalize write on the call record makes every later run a
//! no-op, and the per-call lead claim keeps racing runs on one lead.
//!
//! Steps: load record and session, capture the lead, summarize, finalize,
//! then attach the summary and send the notification, then drop the
//! session. Failures after the record is loaded are logged and recorded,
//! never propagated.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use call_assistant_agent::ConversationStore;
use call_assistant_config::BusinessDirectory;
use call_assistant_core::{
    BusinessProfile, CallRecord, CallSession, CallStatus, Finalization, NotificationStatus,
    SummaryStatus, Turn,
};
use call_assistant_persistence::{CallRecordStore, LeadStore};

use crate::lead_capture::LeadCaptureService;
use crate::notify::NotificationDispatcher;
use crate::summary::{fallback_summary, SummaryRequest, SummaryService};
use crate::CompletionError;

/// What started a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionTrigger {
    /// The assistant hung up
    DialogueEnded,
    /// The gateway reported a terminal call status
    GatewayStatus {
        status: CallStatus,
        duration_secs: Option<u32>,
    },
}

impl CompletionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DialogueEnded => "dialogue_ended",
            Self::GatewayStatus { .. } => "gateway_status",
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionReport {
    /// No call record for the identifier
    NoRecord,
    /// An earlier run already finalized the call
    AlreadyFinalized,
    /// A concurrent run finalized the call first
    LostRace,
    Finalized {
        lead_id: Option<Uuid>,
        summary_status: SummaryStatus,
        notification: Option<NotificationStatus>,
    },
    /// The record could not be loaded or finalized
    Failed(String),
}

impl CompletionReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRecord => "no_record",
            Self::AlreadyFinalized => "already_finalized",
            Self::LostRace => "lost_race",
            Self::Finalized { .. } => "finalized",
            Self::Failed(_) => "failed",
        }
    }
}

/// Post-call pipeline
pub struct CallCompletionPipeline {
    calls: Arc<dyn CallRecordStore>,
    leads: Arc<dyn LeadStore>,
    sessions: Arc<dyn ConversationStore>,
    businesses: Arc<dyn BusinessDirectory>,
    capture: LeadCaptureService,
    summary: Arc<dyn SummaryService>,
    notifier: NotificationDispatcher,
}

impl CallCompletionPipeline {
    pub fn new(
        calls: Arc<dyn CallRecordStore>,
        sessions: Arc<dyn ConversationStore>,
        businesses: Arc<dyn BusinessDirectory>,
        capture: LeadCaptureService,
        summary: Arc<dyn SummaryService>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            calls,
            leads: capture.leads().clone(),
            sessions,
            businesses,
            capture,
            summary,
            notifier,
        }
    }

    /// Run to completion. Never fails; the report says what happened.
    pub async fn run(&self, call_id: &str, trigger: CompletionTrigger) -> CompletionReport {
        let report = match self.try_run(call_id, trigger).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(call_id = %call_id, error = %e, "Call completion failed");
                CompletionReport::Failed(e.to_string())
            }
        };

        tracing::info!(
            call_id = %call_id,
            trigger = trigger.as_str(),
            outcome = report.as_str(),
            "Call completion run finished"
        );

        report
    }

    async fn try_run(
        &self,
        call_id: &str,
        trigger: CompletionTrigger,
    ) -> Result<CompletionReport, CompletionError> {
        let Some(record) = self.calls.get(call_id).await? else {
            tracing::warn!(call_id = %call_id, "No call record to finalize");
            self.drop_session(call_id);
            return Ok(CompletionReport::NoRecord);
        };

        if record.is_finalized() {
            self.drop_session(call_id);
            return Ok(CompletionReport::AlreadyFinalized);
        }

        let session = match self.sessions.get(call_id) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(call_id = %call_id, error = %e, "Session unavailable, using record only");
                None
            }
        };
        let business = self.business_for(&record);

        let collected = session
            .as_ref()
            .map(|s| s.collected.clone())
            .unwrap_or_default();
        let questions = session
            .as_ref()
            .map(|s| s.questions.clone())
            .unwrap_or_default();

        // Lead
        let lead = if !collected.is_empty() || record.has_caller_speech() {
            match self
                .capture
                .capture(&record, &business, &collected, &questions)
                .await
            {
                Ok(lead) => lead,
                Err(e) => {
                    tracing::warn!(call_id = %call_id, error = %e, "Lead capture failed");
                    None
                }
            }
        } else {
            None
        };

        if let Some(lead) = &lead {
            if let Err(e) = self.calls.mark_lead_captured(call_id, lead.id).await {
                tracing::warn!(call_id = %call_id, error = %e, "Failed to mark lead on call record");
            }
        }

        // Summary
        let request = SummaryRequest {
            business_name: business.name.clone(),
            transcript: transcript_of(&record, session.as_ref()),
            collected,
            caller_number: record.from_number.clone(),
            questions,
        };
        let mut summary = self.summary.summarize(&request).await;
        if summary.text.is_none() {
            summary.text = Some(fallback_summary(&request));
        }
        if summary.status == SummaryStatus::Failed {
            tracing::warn!(call_id = %call_id, error = ?summary.error, "Using fallback summary");
        }
        let summary_text = summary.text.clone().unwrap_or_default();

        // Finalize exactly once
        let now = Utc::now();
        let (status, duration) = match trigger {
            CompletionTrigger::GatewayStatus {
                status,
                duration_secs,
            } if status.is_terminal() => (status, duration_secs),
            _ if record.status.is_terminal() => (record.status, None),
            _ => (CallStatus::Completed, None),
        };
        let finalization = Finalization {
            status,
            ended_at: now,
            duration_secs: duration.unwrap_or_else(|| record.resolve_duration(now)),
            summary: summary_text,
        };

        if !self.calls.finalize(call_id, &finalization).await? {
            tracing::info!(call_id = %call_id, "Call finalized by a concurrent run");
            self.drop_session(call_id);
            return Ok(CompletionReport::LostRace);
        }

        // Lead follow-through
        let mut notification_status = None;
        let lead_id = lead.as_ref().map(|l| l.id);
        if let Some(mut lead) = lead {
            if let Err(e) = self.leads.set_summary(lead.id, &summary).await {
                tracing::warn!(lead_id = %lead.id, error = %e, "Failed to attach summary to lead");
            }
            lead.ai_summary = summary.clone();

            let notification = self.notifier.dispatch(&business, &lead).await;
            notification_status = Some(notification.status);

            if let Err(e) = self.leads.set_notification(lead.id, &notification).await {
                tracing::warn!(lead_id = %lead.id, error = %e, "Failed to record notification on lead");
            }
            if let Err(e) = self.calls.record_notification(call_id, &notification).await {
                tracing::warn!(call_id = %call_id, error = %e, "Failed to record notification on call");
            }
        }

        self.drop_session(call_id);

        Ok(CompletionReport::Finalized {
            lead_id,
            summary_status: summary.status,
            notification: notification_status,
        })
    }

    fn business_for(&self, record: &CallRecord) -> BusinessProfile {
        self.businesses.get(&record.business_id).unwrap_or_else(|| {
            tracing::warn!(business_id = %record.business_id, "Unknown business on call record");
            BusinessProfile::new(&record.business_id, &record.business_id)
        })
    }

    fn drop_session(&self, call_id: &str) {
        if let Err(e) = self.sessions.delete(call_id) {
            tracing::warn!(call_id = %call_id, error = %e, "Failed to remove call session");
        }
    }
}

/// Durable transcript, or the session history when nothing was persisted
fn transcript_of(record: &CallRecord, session: Option<&CallSession>) -> Vec<Turn> {
    if !record.transcript.is_empty() {
        return record.transcript.clone();
    }
    session.map(|s| s.history.clone()).unwrap_or_default()
}
