//! Dialogue state machine
//!
//! Advances one call by one recognized utterance per invocation:
//!
//! ```text
//! GREETING -> GET_NAME -> GET_PHONE -> GET_REASON -> FOLLOW_UP -> END
//! ```
//!
//! Every stage is scripted. Only open questions in `GET_REASON` and
//! `FOLLOW_UP` reach the FAQ table and, on a miss, the question answerer,
//! which is capped per call. A goodbye ends the call from any stage, and so
//! do repeated empty turns.
//!
//! Nothing in here fails towards the caller: internal errors are logged and
//! turned into an apology with a reprompt, or a polite hangup when the
//! session is gone.

use std::sync::Arc;
use std::time::Duration;

use call_assistant_config::DialogueConfig;
use call_assistant_core::{BusinessProfile, CallSession, Stage, Turn};
use call_assistant_persistence::CallRecordStore;

use crate::answerer::QuestionAnswerer;
use crate::extract::{extract_name, extract_phone, is_goodbye, is_negative, is_question};
use crate::faq::FaqResolver;
use crate::prompts;
use crate::store::ConversationStore;
use crate::AgentError;

/// What the gateway should do after speaking the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    /// Keep listening for the next utterance
    Continue,
    /// Terminate the call
    Hangup,
}

/// Why the assistant ended a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Caller said goodbye
    Goodbye,
    /// Caller had nothing more after the follow-up question
    Completed,
    /// Too many empty turns
    NoInput,
    /// No session for the call identifier
    LostState,
    /// Internal fault with no session to fall back on
    Error,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Goodbye => "goodbye",
            Self::Completed => "completed",
            Self::NoInput => "no_input",
            Self::LostState => "lost_state",
            Self::Error => "error",
        }
    }
}

/// Result of one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text to speak
    pub prompt: String,
    pub action: CallAction,
    /// Stage after the turn
    pub stage: Stage,
    /// Set when `action` is `Hangup`
    pub end_reason: Option<EndReason>,
    /// The question answerer was called during this turn
    pub llm_attempted: bool,
}

impl TurnOutcome {
    fn listen(prompt: impl Into<String>, stage: Stage) -> Self {
        Self {
            prompt: prompt.into(),
            action: CallAction::Continue,
            stage,
            end_reason: None,
            llm_attempted: false,
        }
    }

    fn hangup(prompt: impl Into<String>, reason: EndReason) -> Self {
        Self {
            prompt: prompt.into(),
            action: CallAction::Hangup,
            stage: Stage::End,
            end_reason: Some(reason),
            llm_attempted: false,
        }
    }

    pub fn is_hangup(&self) -> bool {
        self.action == CallAction::Hangup
    }
}

/// Question the assistant is waiting on in `stage`
fn pending_question(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Greeting | Stage::GetName => Some(prompts::ASK_NAME),
        Stage::GetPhone => Some("What's the best phone number to reach you?"),
        Stage::GetReason => Some(prompts::ASK_REASON),
        Stage::FollowUp => Some(prompts::ANYTHING_ELSE),
        Stage::End => None,
    }
}

fn apology_hangup() -> TurnOutcome {
    TurnOutcome::hangup(
        format!("{} Please call back. Goodbye.", prompts::GENERIC_APOLOGY),
        EndReason::Error,
    )
}

/// Per-call dialogue driver
pub struct DialogueStateMachine {
    sessions: Arc<dyn ConversationStore>,
    calls: Arc<dyn CallRecordStore>,
    answerer: Arc<dyn QuestionAnswerer>,
    faq: FaqResolver,
    config: DialogueConfig,
}

impl DialogueStateMachine {
    pub fn new(
        sessions: Arc<dyn ConversationStore>,
        calls: Arc<dyn CallRecordStore>,
        answerer: Arc<dyn QuestionAnswerer>,
        config: DialogueConfig,
    ) -> Self {
        Self {
            sessions,
            calls,
            answerer,
            faq: FaqResolver::new(),
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn ConversationStore> {
        &self.sessions
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    /// Open the conversation for a new call: create the session, speak the
    /// greeting and ask for the caller's name. A repeated start for a live
    /// call re-speaks the pending prompt.
    pub async fn start_call(
        &self,
        call_id: &str,
        business: &BusinessProfile,
        caller_number: Option<&str>,
    ) -> TurnOutcome {
        match self.try_start_call(call_id, business, caller_number).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(call_id = %call_id, error = %e, "Failed to start call");
                apology_hangup()
            }
        }
    }

    async fn try_start_call(
        &self,
        call_id: &str,
        business: &BusinessProfile,
        caller_number: Option<&str>,
    ) -> Result<TurnOutcome, AgentError> {
        let mut session = CallSession::new(call_id, call_id, business);
        if let Some(number) = caller_number.filter(|n| !n.trim().is_empty()) {
            session = session.with_caller_number(number);
        }

        let prompt = prompts::greeting(business);
        Self::advance(&mut session, Stage::GetName)?;
        let greeting = Turn::assistant(prompt.clone());
        session.history.push(greeting.clone());

        if !self.sessions.create(session)? {
            let existing = self
                .sessions
                .get(call_id)?
                .ok_or_else(|| AgentError::SessionLost(call_id.to_string()))?;
            tracing::info!(call_id = %call_id, stage = %existing.stage, "Call already started, repeating prompt");
            if existing.stage.is_terminal() {
                return Ok(TurnOutcome::hangup(
                    prompts::farewell(&existing.context.business_name, existing.collected.name.as_deref()),
                    EndReason::Goodbye,
                ));
            }
            let prompt = existing.last_prompt().map(str::to_string).unwrap_or(prompt);
            return Ok(TurnOutcome::listen(prompt, existing.stage));
        }

        self.record(call_id, &[greeting]).await;

        tracing::info!(
            call_id = %call_id,
            business_id = %business.id,
            "Call started"
        );

        Ok(TurnOutcome::listen(prompt, Stage::GetName))
    }

    /// Process one recognized utterance. Never fails: faults become an
    /// apology with a reprompt, or a hangup when the session is gone.
    pub async fn handle_turn(
        &self,
        call_id: &str,
        utterance: &str,
        confidence: Option<f32>,
    ) -> TurnOutcome {
        match self.process_turn(call_id, utterance, confidence).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(call_id = %call_id, error = %e, "Turn failed");
                match self.sessions.get(call_id) {
                    Ok(Some(session)) if !session.stage.is_terminal() => {
                        let retry = pending_question(session.stage)
                            .unwrap_or("Could you say that again?");
                        TurnOutcome::listen(
                            format!("{} {}", prompts::GENERIC_APOLOGY, retry),
                            session.stage,
                        )
                    }
                    _ => apology_hangup(),
                }
            }
        }
    }

    async fn process_turn(
        &self,
        call_id: &str,
        utterance: &str,
        confidence: Option<f32>,
    ) -> Result<TurnOutcome, AgentError> {
        let Some(mut session) = self.sessions.get(call_id)? else {
            tracing::warn!(call_id = %call_id, "Turn for unknown call, ending");
            return Ok(TurnOutcome::hangup(prompts::LOST_STATE, EndReason::LostState));
        };

        if session.stage.is_terminal() {
            // Late turn after the call was already ended
            return Ok(TurnOutcome::hangup(
                prompts::farewell(&session.context.business_name, session.collected.name.as_deref()),
                EndReason::Goodbye,
            ));
        }

        let stage_before = session.stage;
        let questions_before = session.question_count;
        let text = utterance.trim();
        let mut recorded = Vec::new();

        let mut outcome = if text.is_empty() {
            session.no_input_count += 1;
            if session.no_input_count >= self.config.max_no_input {
                tracing::info!(call_id = %call_id, no_input = session.no_input_count, "Ending call after repeated silence");
                Self::end(&mut session, prompts::NO_INPUT_END, EndReason::NoInput)
            } else {
                TurnOutcome::listen(prompts::no_input(pending_question(session.stage)), session.stage)
            }
        } else if confidence.is_some_and(|c| c < self.config.min_confidence) {
            tracing::debug!(call_id = %call_id, confidence = ?confidence, "Low confidence, reprompting");
            TurnOutcome::listen(prompts::LOW_CONFIDENCE_REPROMPT, session.stage)
        } else {
            session.no_input_count = 0;
            let caller_turn = Turn::caller(text);
            session.history.push(caller_turn.clone());
            recorded.push(caller_turn);

            if is_goodbye(text) {
                let line = if session.stage == Stage::FollowUp {
                    prompts::closing(&session.context.business_name, &session.collected)
                } else {
                    prompts::farewell(&session.context.business_name, session.collected.name.as_deref())
                };
                Self::end(&mut session, line, EndReason::Goodbye)
            } else {
                match session.stage {
                    Stage::Greeting => {
                        Self::advance(&mut session, Stage::GetName)?;
                        self.on_name(&mut session, text)?
                    }
                    Stage::GetName => self.on_name(&mut session, text)?,
                    Stage::GetPhone => self.on_phone(&mut session, text)?,
                    Stage::GetReason => self.on_reason(&mut session, text).await?,
                    Stage::FollowUp => self.on_follow_up(&mut session, text).await?,
                    Stage::End => {
                        let line = prompts::farewell(
                            &session.context.business_name,
                            session.collected.name.as_deref(),
                        );
                        Self::end(&mut session, line, EndReason::Goodbye)
                    }
                }
            }
        };

        outcome.llm_attempted = session.question_count > questions_before;

        let assistant_turn = Turn::assistant(outcome.prompt.clone());
        session.history.push(assistant_turn.clone());
        recorded.push(assistant_turn);

        tracing::debug!(
            call_id = %call_id,
            from = %stage_before,
            to = %session.stage,
            action = ?outcome.action,
            "Turn processed"
        );

        // Completion may have dropped the session while this turn ran
        if !self.sessions.update(session)? {
            tracing::info!(call_id = %call_id, "Call finalized mid-turn, session not restored");
        }
        self.record(call_id, &recorded).await;

        Ok(outcome)
    }

    fn on_name(&self, session: &mut CallSession, text: &str) -> Result<TurnOutcome, AgentError> {
        let name = extract_name(text);
        if name.is_none() {
            tracing::debug!(call_id = %session.call_id, "No name recognized, moving on");
        }
        session.collected.name = name;
        Self::advance(session, Stage::GetPhone)?;
        Ok(TurnOutcome::listen(
            prompts::ask_phone(session.collected.name.as_deref()),
            Stage::GetPhone,
        ))
    }

    fn on_phone(&self, session: &mut CallSession, text: &str) -> Result<TurnOutcome, AgentError> {
        let phone = extract_phone(text);
        let lead_in = match (&phone, &session.caller_number) {
            (Some(_), _) => "Got it.",
            (None, Some(_)) => "No problem, we'll use the number you're calling from.",
            (None, None) => "No problem.",
        };
        session.collected.phone = phone;
        Self::advance(session, Stage::GetReason)?;
        Ok(TurnOutcome::listen(
            format!("{} {}", lead_in, prompts::ASK_REASON),
            Stage::GetReason,
        ))
    }

    async fn on_reason(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<TurnOutcome, AgentError> {
        session.collected.reason = Some(text.to_string());
        if is_question(text) {
            session.questions.push(text.to_string());
        }

        let prompt = match self.resolve_question(session, text).await {
            Some(answer) => prompts::answer_then_continue(&answer),
            None => format!("{} {}", prompts::REASON_NOTED, prompts::ANYTHING_ELSE),
        };

        Self::advance(session, Stage::FollowUp)?;
        Ok(TurnOutcome::listen(prompt, Stage::FollowUp))
    }

    async fn on_follow_up(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<TurnOutcome, AgentError> {
        if is_negative(text) {
            let line = prompts::closing(&session.context.business_name, &session.collected);
            return Ok(Self::end(session, line, EndReason::Completed));
        }

        session.questions.push(text.to_string());

        let prompt = match self.resolve_question(session, text).await {
            Some(answer) => prompts::answer_then_continue(&answer),
            None => format!("{} {}", prompts::DEFLECTION, prompts::ANYTHING_ELSE),
        };

        Self::advance(session, Stage::FollowUp)?;
        Ok(TurnOutcome::listen(prompt, Stage::FollowUp))
    }

    /// FAQ first; then the answerer while the per-call budget lasts. Every
    /// answerer attempt is charged, successful, failed or timed out.
    async fn resolve_question(&self, session: &mut CallSession, text: &str) -> Option<String> {
        if let Some(faq) = self.faq.resolve(text, &session.context.faqs) {
            tracing::debug!(call_id = %session.call_id, question = %faq.question, "Answered from FAQ");
            return Some(faq.answer.clone());
        }

        if session.question_count >= self.config.max_llm_questions {
            tracing::info!(
                call_id = %session.call_id,
                used = session.question_count,
                "LLM question budget exhausted, deflecting"
            );
            return None;
        }

        session.question_count += 1;
        let budget = Duration::from_secs(self.config.answer_timeout_secs.max(1));
        let answer = self
            .answerer
            .answer(text, &session.context, &session.history);
        match tokio::time::timeout(budget, answer).await {
            Ok(Ok(answer)) => Some(answer),
            Ok(Err(e)) => {
                tracing::warn!(call_id = %session.call_id, error = %e, "Question answerer failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    call_id = %session.call_id,
                    budget_secs = budget.as_secs(),
                    "Question answerer timed out, deflecting"
                );
                None
            }
        }
    }

    fn advance(session: &mut CallSession, to: Stage) -> Result<(), AgentError> {
        if !session.stage.can_transition_to(to) {
            return Err(AgentError::InvalidTransition {
                from: session.stage,
                to,
            });
        }
        session.stage = to;
        Ok(())
    }

    fn end(session: &mut CallSession, line: impl Into<String>, reason: EndReason) -> TurnOutcome {
        // Every stage may move to End
        session.stage = Stage::End;
        tracing::info!(call_id = %session.call_id, reason = reason.as_str(), "Call ended by assistant");
        TurnOutcome::hangup(line, reason)
    }

    /// Append turns to the durable transcript. Failures are logged only;
    /// the conversation goes on without them.
    async fn record(&self, call_id: &str, turns: &[Turn]) {
        if turns.is_empty() {
            return;
        }
        if let Err(e) = self.calls.append_transcript(call_id, turns).await {
            tracing::warn!(call_id = %call_id, error = %e, "Failed to append transcript");
        }
    }
}
