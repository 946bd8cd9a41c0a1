//! Call conversation engine
//!
//! Features:
//! - Keyed conversation store for per-call dialogue state
//! - Scripted stage machine (greeting, name, phone, reason, follow-up)
//! - FAQ matching before any language-model call
//! - Budgeted open-question answering with a fixed persona

pub mod answerer;
pub mod extract;
pub mod faq;
pub mod machine;
pub mod prompts;
pub mod store;

pub use answerer::{LlmQuestionAnswerer, QuestionAnswerer};
pub use faq::FaqResolver;
pub use machine::{CallAction, DialogueStateMachine, EndReason, TurnOutcome};
pub use store::{ConversationStore, InMemoryConversationStore};

use call_assistant_core::Stage;
use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Conversation store error: {0}")]
    Store(String),

    #[error("Session lost: {0}")]
    SessionLost(String),

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("Answerer error: {0}")]
    Answerer(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

impl From<call_assistant_llm::LlmError> for AgentError {
    fn from(err: call_assistant_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}
