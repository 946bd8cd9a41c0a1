//! End-to-end dialogue tests against in-memory stores

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use call_assistant_agent::{
    AgentError, CallAction, ConversationStore, DialogueStateMachine, EndReason,
    InMemoryConversationStore, QuestionAnswerer,
};
use call_assistant_config::DialogueConfig;
use call_assistant_core::{
    BusinessContext, BusinessProfile, CallRecord, CallSession, FaqEntry, Stage, Turn, TurnRole,
};
use call_assistant_persistence::{CallRecordStore, InMemoryCallStore};

const CALL_ID: &str = "CA-test-1";

/// Counts calls and answers with a canned line, or fails
struct ScriptedAnswerer {
    calls: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl ScriptedAnswerer {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
            delay: None,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
            delay: None,
        })
    }

    /// Answers successfully, but only after `delay`
    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
            delay: Some(delay),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionAnswerer for ScriptedAnswerer {
    async fn answer(
        &self,
        _question: &str,
        _context: &BusinessContext,
        _history: &[Turn],
    ) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            Err(AgentError::Answerer("service unavailable".into()))
        } else {
            Ok("Yes, we can help with that.".into())
        }
    }
}

/// Conversation store whose writes always fail
struct BrokenStore {
    inner: InMemoryConversationStore,
}

impl ConversationStore for BrokenStore {
    fn get(&self, call_id: &str) -> Result<Option<CallSession>, AgentError> {
        self.inner.get(call_id)
    }

    fn set(&self, _session: CallSession) -> Result<(), AgentError> {
        Err(AgentError::Store("write refused".into()))
    }

    fn update(&self, _session: CallSession) -> Result<bool, AgentError> {
        Err(AgentError::Store("write refused".into()))
    }

    fn delete(&self, call_id: &str) -> Result<Option<CallSession>, AgentError> {
        self.inner.delete(call_id)
    }

    fn create(&self, session: CallSession) -> Result<bool, AgentError> {
        self.inner.create(session)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

fn business() -> BusinessProfile {
    BusinessProfile::new("acme", "Acme Plumbing")
        .with_faq(FaqEntry::new(
            "What are your hours?",
            "We're open 8 to 6, Monday through Saturday.",
        ))
        .with_services(&["drain cleaning", "water heaters"])
}

struct Harness {
    machine: DialogueStateMachine,
    sessions: Arc<InMemoryConversationStore>,
    calls: Arc<InMemoryCallStore>,
}

impl Harness {
    fn new(answerer: Arc<dyn QuestionAnswerer>) -> Self {
        Self::with_config(answerer, DialogueConfig::default())
    }

    fn with_config(answerer: Arc<dyn QuestionAnswerer>, config: DialogueConfig) -> Self {
        let sessions = Arc::new(InMemoryConversationStore::new());
        let calls = Arc::new(InMemoryCallStore::new());
        let machine = DialogueStateMachine::new(sessions.clone(), calls.clone(), answerer, config);
        Self {
            machine,
            sessions,
            calls,
        }
    }

    async fn start(&self) {
        self.calls
            .create(&CallRecord::new(CALL_ID, "acme"))
            .await
            .unwrap();
        let outcome = self
            .machine
            .start_call(CALL_ID, &business(), Some("+15550001111"))
            .await;
        assert_eq!(outcome.stage, Stage::GetName);
        assert!(outcome.prompt.contains("Acme Plumbing"));
    }

    async fn say(&self, text: &str) -> call_assistant_agent::TurnOutcome {
        self.machine.handle_turn(CALL_ID, text, Some(0.9)).await
    }

    fn session(&self) -> CallSession {
        self.sessions.get(CALL_ID).unwrap().unwrap()
    }

    /// Walk to FOLLOW_UP with a plain statement as the reason
    async fn to_follow_up(&self) {
        self.start().await;
        self.say("my name is sam jones").await;
        self.say("five five five one two three four five six seven").await;
        let outcome = self.say("my kitchen sink is leaking").await;
        assert_eq!(outcome.stage, Stage::FollowUp);
    }
}

#[tokio::test]
async fn test_scripted_flow_collects_fields() {
    let answerer = ScriptedAnswerer::ok();
    let h = Harness::new(answerer.clone());
    h.start().await;

    let outcome = h.say("yeah my name is sam jones").await;
    assert_eq!(outcome.stage, Stage::GetPhone);
    assert!(outcome.prompt.contains("Sam Jones"));

    let outcome = h.say("it's 555-123-4567").await;
    assert_eq!(outcome.stage, Stage::GetReason);

    let outcome = h.say("my water heater stopped working").await;
    assert_eq!(outcome.stage, Stage::FollowUp);
    assert_eq!(outcome.action, CallAction::Continue);

    let outcome = h.say("no thanks").await;
    assert_eq!(outcome.action, CallAction::Hangup);
    assert_eq!(outcome.end_reason, Some(EndReason::Completed));
    assert!(outcome.prompt.contains("Sam Jones"));
    assert!(outcome.prompt.contains("5 5 5, 1 2 3, 4 5 6 7"));

    let session = h.session();
    assert_eq!(session.stage, Stage::End);
    assert_eq!(session.collected.name.as_deref(), Some("Sam Jones"));
    assert_eq!(session.collected.phone.as_deref(), Some("5551234567"));
    assert_eq!(
        session.collected.reason.as_deref(),
        Some("my water heater stopped working")
    );

    // Transcript mirrors the history: greeting plus four exchanges
    let record = h.calls.get(CALL_ID).await.unwrap().unwrap();
    assert_eq!(record.transcript.len(), 9);
    assert_eq!(record.transcript[0].role, TurnRole::Assistant);
    assert_eq!(record.transcript[1].text, "yeah my name is sam jones");
}

#[tokio::test]
async fn test_three_empty_turns_end_the_call() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.start().await;

    let first = h.say("").await;
    assert_eq!(first.action, CallAction::Continue);
    assert_eq!(first.stage, Stage::GetName);
    assert!(first.prompt.contains("May I have your name"));

    let second = h.say("   ").await;
    assert_eq!(second.action, CallAction::Continue);

    let third = h.say("").await;
    assert_eq!(third.action, CallAction::Hangup);
    assert_eq!(third.end_reason, Some(EndReason::NoInput));
    assert!(third.prompt.contains("having trouble hearing you"));
    assert_eq!(h.session().stage, Stage::End);
}

#[tokio::test]
async fn test_speech_resets_no_input_counter() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.start().await;

    h.say("").await;
    h.say("").await;
    h.say("sam").await;
    assert_eq!(h.session().no_input_count, 0);

    h.say("").await;
    let outcome = h.say("").await;
    assert_eq!(outcome.action, CallAction::Continue);
    assert_eq!(outcome.stage, Stage::GetPhone);
}

#[tokio::test]
async fn test_goodbye_mid_phone_ends_immediately() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.start().await;
    h.say("this is maria").await;

    let outcome = h.say("Actually never mind, goodbye").await;
    assert_eq!(outcome.action, CallAction::Hangup);
    assert_eq!(outcome.end_reason, Some(EndReason::Goodbye));
    assert!(outcome.prompt.contains("Acme Plumbing"));
    assert!(outcome.prompt.contains("Maria"));

    let session = h.session();
    assert_eq!(session.stage, Stage::End);
    assert!(session.collected.reason.is_none());
}

#[tokio::test]
async fn test_goodbye_mid_name() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.start().await;

    let outcome = h.say("ok bye").await;
    assert!(outcome.is_hangup());
    assert!(h.session().collected.name.is_none());
}

#[tokio::test]
async fn test_low_confidence_changes_nothing() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.start().await;

    let outcome = h
        .machine
        .handle_turn(CALL_ID, "my name is sam", Some(0.1))
        .await;
    assert_eq!(outcome.action, CallAction::Continue);
    assert_eq!(outcome.stage, Stage::GetName);

    let session = h.session();
    assert_eq!(session.stage, Stage::GetName);
    assert!(session.collected.is_empty());
    assert!(session
        .history
        .iter()
        .all(|t| t.role == TurnRole::Assistant));

    // Missing confidence is treated as confident
    let outcome = h.machine.handle_turn(CALL_ID, "sam", None).await;
    assert_eq!(outcome.stage, Stage::GetPhone);
}

#[tokio::test]
async fn test_faq_answers_without_language_model() {
    let answerer = ScriptedAnswerer::ok();
    let h = Harness::new(answerer.clone());
    h.start().await;
    h.say("sam").await;
    h.say("5551234567").await;

    let outcome = h.say("what time are you open, what are your hours").await;
    assert_eq!(outcome.stage, Stage::FollowUp);
    assert!(outcome.prompt.contains("8 to 6"));
    assert_eq!(answerer.calls(), 0);
    assert_eq!(h.session().question_count, 0);

    let outcome = h.say("and your hours on saturday?").await;
    assert!(outcome.prompt.contains("8 to 6"));
    assert_eq!(answerer.calls(), 0);
    assert_eq!(h.session().question_count, 0);
}

#[tokio::test]
async fn test_question_budget_is_a_hard_cap() {
    let answerer = ScriptedAnswerer::ok();
    let h = Harness::new(answerer.clone());
    h.start().await;
    h.say("sam").await;
    h.say("5551234567").await;

    // The reason itself is an open question and uses the first answer
    let outcome = h.say("do you service tankless water heaters?").await;
    assert!(outcome.prompt.starts_with("Yes, we can help with that."));
    assert_eq!(h.session().question_count, 1);

    for _ in 0..10 {
        let outcome = h.say("can you also look at my garbage disposal?").await;
        assert_eq!(outcome.stage, Stage::FollowUp);
        assert_eq!(outcome.action, CallAction::Continue);
    }

    assert_eq!(answerer.calls(), 3);
    let session = h.session();
    assert_eq!(session.question_count, 3);
    assert_eq!(session.questions.len(), 11);

    let outcome = h.say("how about a sump pump?").await;
    assert!(outcome.prompt.contains("Someone from our team will call you back"));
    assert_eq!(answerer.calls(), 3);
}

#[tokio::test]
async fn test_failed_answer_still_counts_and_recovers() {
    let answerer = ScriptedAnswerer::failing();
    let h = Harness::new(answerer.clone());
    h.to_follow_up().await;

    let outcome = h.say("do you do gas lines?").await;
    assert_eq!(outcome.action, CallAction::Continue);
    assert!(outcome.prompt.contains("Someone from our team will call you back"));
    assert!(outcome.prompt.ends_with("Is there anything else I can help you with?"));
    // One for the reason, one for the follow-up
    assert_eq!(answerer.calls(), 2);
    assert_eq!(h.session().question_count, 2);
}

#[tokio::test]
async fn test_slow_answer_is_deflected_within_budget() {
    let answerer = ScriptedAnswerer::slow(Duration::from_secs(30));
    let config = DialogueConfig {
        answer_timeout_secs: 1,
        ..Default::default()
    };
    let h = Harness::with_config(answerer.clone(), config);
    h.start().await;
    h.say("sam").await;
    h.say("5551234567").await;

    let started = Instant::now();
    let outcome = h.say("my basement drain backs up when it rains").await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(outcome.action, CallAction::Continue);
    assert_eq!(outcome.stage, Stage::FollowUp);
    assert!(outcome.llm_attempted);
    assert!(outcome.prompt.starts_with("Thank you, I've noted that"));

    // The timed-out attempt is charged and the turn is kept
    let session = h.session();
    assert_eq!(session.question_count, 1);
    assert_eq!(
        session.collected.reason.as_deref(),
        Some("my basement drain backs up when it rains")
    );
    assert_eq!(answerer.calls(), 1);
}

#[tokio::test]
async fn test_finalized_session_is_not_restored_by_late_turn() {
    let h = Harness::new(ScriptedAnswerer::slow(Duration::from_millis(300)));
    h.start().await;
    h.say("sam").await;
    h.say("5551234567").await;

    // Call completion drops the session while the answer is pending
    let (outcome, dropped) = tokio::join!(h.say("do you fix sump pumps?"), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.sessions.delete(CALL_ID).unwrap()
    });

    assert!(dropped.is_some());
    assert_eq!(outcome.action, CallAction::Continue);
    assert!(h.sessions.get(CALL_ID).unwrap().is_none());
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn test_reason_mentioning_leaving_is_not_a_goodbye() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.start().await;
    h.say("sam").await;
    h.say("5551234567").await;

    let reason = "my toilet keeps running and I have to go to work at noon so afternoon is best";
    let outcome = h.say(reason).await;
    assert_eq!(outcome.action, CallAction::Continue);
    assert_eq!(outcome.stage, Stage::FollowUp);
    assert_eq!(h.session().collected.reason.as_deref(), Some(reason));

    let outcome = h.say("I need someone to hang up a shelf and mount a tv").await;
    assert_eq!(outcome.action, CallAction::Continue);
    assert_eq!(outcome.stage, Stage::FollowUp);
}

#[tokio::test]
async fn test_goodbye_in_follow_up_closes_with_summary() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.to_follow_up().await;

    let outcome = h.say("that's all, goodbye").await;
    assert_eq!(outcome.end_reason, Some(EndReason::Goodbye));
    assert!(outcome.prompt.contains("Sam Jones"));
    assert!(outcome.prompt.contains("call you back at"));
}

#[tokio::test]
async fn test_turn_after_end_repeats_farewell() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.start().await;
    h.say("bye").await;

    let outcome = h.say("hello?").await;
    assert!(outcome.is_hangup());
    assert_eq!(outcome.stage, Stage::End);
}

#[tokio::test]
async fn test_unknown_call_hangs_up() {
    let h = Harness::new(ScriptedAnswerer::ok());
    let outcome = h.say("hello").await;
    assert!(outcome.is_hangup());
    assert_eq!(outcome.end_reason, Some(EndReason::LostState));
}

#[tokio::test]
async fn test_repeated_start_keeps_progress() {
    let h = Harness::new(ScriptedAnswerer::ok());
    h.start().await;
    h.say("sam").await;

    let outcome = h.machine.start_call(CALL_ID, &business(), None).await;
    assert_eq!(outcome.stage, Stage::GetPhone);
    assert!(outcome.prompt.contains("phone number"));
    assert_eq!(h.session().collected.name.as_deref(), Some("Sam"));
}

#[tokio::test]
async fn test_store_failure_apologizes_and_reprompts() {
    let sessions = Arc::new(BrokenStore {
        inner: InMemoryConversationStore::new(),
    });
    let machine = DialogueStateMachine::new(
        sessions,
        Arc::new(InMemoryCallStore::new()),
        ScriptedAnswerer::ok(),
        DialogueConfig::default(),
    );

    let outcome = machine.start_call(CALL_ID, &business(), None).await;
    assert_eq!(outcome.stage, Stage::GetName);

    let outcome = machine.handle_turn(CALL_ID, "sam", Some(0.9)).await;
    assert_eq!(outcome.action, CallAction::Continue);
    assert_eq!(outcome.stage, Stage::GetName);
    assert!(outcome.prompt.starts_with("I'm sorry, something went wrong"));
    assert!(outcome.prompt.contains("May I have your name"));
}

#[tokio::test]
async fn test_transcript_failure_does_not_break_dialogue() {
    // No call record exists, so transcript appends fail
    let sessions = Arc::new(InMemoryConversationStore::new());
    let machine = DialogueStateMachine::new(
        sessions,
        Arc::new(InMemoryCallStore::new()),
        ScriptedAnswerer::ok(),
        DialogueConfig::default(),
    );

    machine.start_call(CALL_ID, &business(), None).await;
    let outcome = machine.handle_turn(CALL_ID, "sam", Some(0.9)).await;
    assert_eq!(outcome.stage, Stage::GetPhone);
}
