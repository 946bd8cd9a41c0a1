//! Completion pipeline against in-memory stores and scripted adapters

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use call_assistant_agent::{ConversationStore, InMemoryConversationStore};
use call_assistant_completion::{
    CallCompletionPipeline, CompletionError, CompletionReport, CompletionTrigger, EmailMessage,
    EmailTransport, LeadCaptureService, NotificationDispatcher, SummaryRequest, SummaryService,
};
use call_assistant_config::{NotificationConfig, StaticBusinessDirectory};
use call_assistant_core::{
    AiSummary, BusinessProfile, CallRecord, CallSession, CallStatus, CollectedInfo,
    NotificationStatus, QualityTier, SummaryStatus, Turn,
};
use call_assistant_persistence::{
    CallRecordStore, InMemoryCallStore, InMemoryLeadStore, LeadStore,
};

struct ScriptedSummary {
    fail: bool,
}

#[async_trait]
impl SummaryService for ScriptedSummary {
    async fn summarize(&self, _request: &SummaryRequest) -> AiSummary {
        if self.fail {
            AiSummary {
                text: None,
                status: SummaryStatus::Failed,
                model: Some("test-model".into()),
                error: Some("completion service timed out".into()),
                generated_at: Some(Utc::now()),
            }
        } else {
            AiSummary {
                text: Some("Caller: Sam\nPhone: 5551234567\nIntent: leak\nUrgency: high\nNext step: call back\nNotes: unclear".into()),
                status: SummaryStatus::Success,
                model: Some("test-model".into()),
                error: None,
                generated_at: Some(Utc::now()),
            }
        }
    }
}

struct ScriptedTransport {
    sent: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl EmailTransport for ScriptedTransport {
    async fn send(&self, _message: &EmailMessage) -> Result<(), CompletionError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(CompletionError::Notification("relay refused".into()))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct Fixture {
    pipeline: Arc<CallCompletionPipeline>,
    calls: Arc<InMemoryCallStore>,
    leads: Arc<InMemoryLeadStore>,
    sessions: Arc<InMemoryConversationStore>,
    transport: Arc<ScriptedTransport>,
}

fn business() -> BusinessProfile {
    BusinessProfile::new("acme", "Acme Plumbing")
        .with_services(&["drain cleaning", "water heaters"])
        .with_notification_email("owner@acme.com")
}

fn fixture(summary_fails: bool, email_fails: bool) -> Fixture {
    let calls = Arc::new(InMemoryCallStore::new());
    let leads = Arc::new(InMemoryLeadStore::new());
    let sessions = Arc::new(InMemoryConversationStore::new());
    let transport = Arc::new(ScriptedTransport {
        sent: AtomicUsize::new(0),
        fail: email_fails,
    });

    let pipeline = CallCompletionPipeline::new(
        calls.clone(),
        sessions.clone(),
        Arc::new(StaticBusinessDirectory::new(vec![business()])),
        LeadCaptureService::new(leads.clone()),
        Arc::new(ScriptedSummary {
            fail: summary_fails,
        }),
        NotificationDispatcher::new(transport.clone(), &NotificationConfig::default()),
    );

    Fixture {
        pipeline: Arc::new(pipeline),
        calls,
        leads,
        sessions,
        transport,
    }
}

impl Fixture {
    /// Record plus session for a call that went through the dialogue
    async fn seed_call(&self, call_id: &str, collected: CollectedInfo, questions: &[&str]) {
        let record = CallRecord::new(call_id, "acme")
            .with_numbers(Some("+15550009999".into()), Some("+15550001111".into()));
        self.calls.create(&record).await.unwrap();
        self.calls
            .append_transcript(
                call_id,
                &[
                    Turn::assistant("Thanks for calling Acme Plumbing. May I have your name, please?"),
                    Turn::caller(collected.name.clone().unwrap_or_else(|| "um".into())),
                ],
            )
            .await
            .unwrap();

        let mut session = CallSession::new(call_id, call_id, &business());
        session.collected = collected;
        session.questions = questions.iter().map(|q| q.to_string()).collect();
        self.sessions.set(session).unwrap();
    }
}

fn sam(phone: &str, reason: &str) -> CollectedInfo {
    CollectedInfo {
        name: Some("Sam Jones".into()),
        phone: Some(phone.into()),
        reason: Some(reason.into()),
    }
}

#[tokio::test]
async fn test_double_run_is_idempotent() {
    let f = fixture(false, false);
    f.seed_call("CA1", sam("5551234567", "leaking sink"), &[]).await;

    let first = f.pipeline.run("CA1", CompletionTrigger::DialogueEnded).await;
    let CompletionReport::Finalized {
        lead_id,
        summary_status,
        notification,
    } = first
    else {
        panic!("expected finalized, got {:?}", first);
    };
    assert!(lead_id.is_some());
    assert_eq!(summary_status, SummaryStatus::Success);
    assert_eq!(notification, Some(NotificationStatus::Sent));

    let second = f
        .pipeline
        .run(
            "CA1",
            CompletionTrigger::GatewayStatus {
                status: CallStatus::Completed,
                duration_secs: Some(42),
            },
        )
        .await;
    assert_eq!(second, CompletionReport::AlreadyFinalized);

    assert_eq!(f.leads.len(), 1);
    assert_eq!(f.transport.sent.load(Ordering::SeqCst), 1);

    let record = f.calls.get("CA1").await.unwrap().unwrap();
    assert!(record.is_finalized());
    assert_eq!(record.status, CallStatus::Completed);
    assert!(record.lead_captured);
    assert_eq!(record.lead_id, lead_id);
    assert!(record.conversation_summary.unwrap().starts_with("Caller: Sam"));

    // Session is gone once the call is finalized
    assert!(f.sessions.get("CA1").unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_triggers_converge() {
    let f = fixture(false, false);
    f.seed_call("CA2", sam("5551234567", "water heater quote"), &[]).await;

    let a = {
        let pipeline = f.pipeline.clone();
        tokio::spawn(async move { pipeline.run("CA2", CompletionTrigger::DialogueEnded).await })
    };
    let b = {
        let pipeline = f.pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .run(
                    "CA2",
                    CompletionTrigger::GatewayStatus {
                        status: CallStatus::Completed,
                        duration_secs: None,
                    },
                )
                .await
        })
    };
    let reports = [a.await.unwrap(), b.await.unwrap()];

    let finalized = reports
        .iter()
        .filter(|r| matches!(r, CompletionReport::Finalized { .. }))
        .count();
    assert_eq!(finalized, 1, "reports: {:?}", reports);
    assert!(reports.iter().all(|r| matches!(
        r,
        CompletionReport::Finalized { .. }
            | CompletionReport::AlreadyFinalized
            | CompletionReport::LostRace
    )));

    assert_eq!(f.leads.len(), 1);
    assert_eq!(f.transport.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_summary_uses_fallback() {
    let f = fixture(true, false);
    f.seed_call("CA3", sam("5551234567", "clogged drain"), &[]).await;

    let report = f.pipeline.run("CA3", CompletionTrigger::DialogueEnded).await;
    let CompletionReport::Finalized {
        lead_id: Some(lead_id),
        summary_status,
        ..
    } = report
    else {
        panic!("expected finalized with lead, got {:?}", report);
    };
    assert_eq!(summary_status, SummaryStatus::Failed);

    let lead = f.leads.get(lead_id).await.unwrap().unwrap();
    assert_eq!(lead.ai_summary.status, SummaryStatus::Failed);
    assert_eq!(
        lead.ai_summary.error.as_deref(),
        Some("completion service timed out")
    );
    let text = lead.ai_summary.text.unwrap();
    assert!(text.contains("Caller: Sam Jones"));
    assert!(text.contains("Intent: clogged drain"));

    let record = f.calls.get("CA3").await.unwrap().unwrap();
    assert!(record.is_finalized());
    assert!(record.conversation_summary.unwrap().contains("Caller: Sam Jones"));
}

#[tokio::test]
async fn test_failing_notification_is_recorded() {
    let f = fixture(false, true);
    f.seed_call("CA4", sam("5551234567", "leak"), &[]).await;

    let report = f.pipeline.run("CA4", CompletionTrigger::DialogueEnded).await;
    let CompletionReport::Finalized {
        lead_id: Some(lead_id),
        notification,
        ..
    } = report
    else {
        panic!("expected finalized with lead, got {:?}", report);
    };
    assert_eq!(notification, Some(NotificationStatus::Failed));

    let lead = f.leads.get(lead_id).await.unwrap().unwrap();
    let record = lead.notification.unwrap();
    assert_eq!(record.status, NotificationStatus::Failed);
    assert!(record.recipients.is_empty());
    assert!(record.error.is_some());

    // Summary was still attached
    assert_eq!(lead.ai_summary.status, SummaryStatus::Success);

    let call = f.calls.get("CA4").await.unwrap().unwrap();
    assert_eq!(
        call.notification.map(|n| n.status),
        Some(NotificationStatus::Failed)
    );
}

#[tokio::test]
async fn test_repeat_caller_merges_into_one_lead() {
    let f = fixture(false, false);

    f.seed_call(
        "CA5",
        sam("+1 (555) 123-4567", "just looking at water heaters"),
        &["do you install water heaters?"],
    )
    .await;
    f.pipeline.run("CA5", CompletionTrigger::DialogueEnded).await;

    f.seed_call(
        "CA6",
        sam("555.123.4567", "water heater burst, need someone today"),
        &["are you open on sunday?", "Do you install water heaters?"],
    )
    .await;
    f.pipeline.run("CA6", CompletionTrigger::DialogueEnded).await;

    let leads = f.leads.for_business("acme");
    assert_eq!(leads.len(), 1);
    let lead = &leads[0];
    assert_eq!(lead.call_ids, vec!["CA5".to_string(), "CA6".to_string()]);
    assert_eq!(lead.quality, QualityTier::Hot);
    assert_eq!(
        lead.questions,
        vec![
            "do you install water heaters?".to_string(),
            "are you open on sunday?".to_string()
        ]
    );
    assert_eq!(lead.follow_up_notes.len(), 1);

    let first = f.calls.get("CA5").await.unwrap().unwrap();
    let second = f.calls.get("CA6").await.unwrap().unwrap();
    assert_eq!(first.lead_id, second.lead_id);
}

#[tokio::test]
async fn test_missing_record() {
    let f = fixture(false, false);
    let report = f.pipeline.run("CA-none", CompletionTrigger::DialogueEnded).await;
    assert_eq!(report, CompletionReport::NoRecord);
    assert!(f.leads.is_empty());
}

#[tokio::test]
async fn test_unanswered_call_keeps_gateway_status() {
    let f = fixture(false, false);
    f.calls
        .create(&CallRecord::new("CA7", "acme"))
        .await
        .unwrap();

    let report = f
        .pipeline
        .run(
            "CA7",
            CompletionTrigger::GatewayStatus {
                status: CallStatus::NoAnswer,
                duration_secs: Some(0),
            },
        )
        .await;
    assert!(matches!(
        report,
        CompletionReport::Finalized { lead_id: None, notification: None, .. }
    ));

    let record = f.calls.get("CA7").await.unwrap().unwrap();
    assert_eq!(record.status, CallStatus::NoAnswer);
    assert_eq!(record.duration_secs, Some(0));
    assert!(!record.lead_captured);
    assert!(f.leads.is_empty());
}
