//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use call_assistant_agent::{
    ConversationStore, DialogueStateMachine, InMemoryConversationStore, LlmQuestionAnswerer,
};
use call_assistant_completion::{
    CallCompletionPipeline, EmailTransport, LeadCaptureService, LlmLeadExtractor,
    LlmSummaryService, NotificationDispatcher,
};
use call_assistant_config::{BusinessDirectory, Settings};
use call_assistant_llm::LlmBackend;
use call_assistant_persistence::{CallRecordStore, PersistenceLayer, StorageBackend};

use crate::twiml::VoiceSettings;

/// Completion services used by the state
#[derive(Clone)]
pub struct Adapters {
    /// Answers open questions during the call
    pub answers: Arc<dyn LlmBackend>,
    /// Summaries and transcript extraction after the call
    pub summaries: Arc<dyn LlmBackend>,
    pub email: Arc<dyn EmailTransport>,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub businesses: Arc<dyn BusinessDirectory>,
    pub calls: Arc<dyn CallRecordStore>,
    pub sessions: Arc<dyn ConversationStore>,
    pub machine: Arc<DialogueStateMachine>,
    pub pipeline: Arc<CallCompletionPipeline>,
    pub llm: Arc<dyn LlmBackend>,
    pub storage: StorageBackend,
    voice: VoiceSettings,
}

impl AppState {
    /// Wire the dialogue engine and completion pipeline over the given stores
    pub fn new(
        config: Settings,
        persistence: PersistenceLayer,
        businesses: Arc<dyn BusinessDirectory>,
        adapters: Adapters,
    ) -> Self {
        let sessions: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());

        let machine = DialogueStateMachine::new(
            sessions.clone(),
            persistence.calls.clone(),
            Arc::new(LlmQuestionAnswerer::new(adapters.answers.clone())),
            config.dialogue.clone(),
        );

        let capture = LeadCaptureService::new(persistence.leads.clone())
            .with_extractor(Arc::new(LlmLeadExtractor::new(adapters.summaries.clone())));
        let pipeline = CallCompletionPipeline::new(
            persistence.calls.clone(),
            sessions.clone(),
            businesses.clone(),
            capture,
            Arc::new(LlmSummaryService::new(adapters.summaries)),
            NotificationDispatcher::new(adapters.email, &config.notifications),
        );

        Self {
            voice: VoiceSettings::from(&config.dialogue),
            config: Arc::new(config),
            businesses,
            calls: persistence.calls,
            sessions,
            machine: Arc::new(machine),
            pipeline: Arc::new(pipeline),
            llm: adapters.answers,
            storage: persistence.backend,
        }
    }

    pub fn voice(&self) -> &VoiceSettings {
        &self.voice
    }

    /// Absolute callback URL for `path`, or the bare path when no public
    /// URL is configured
    pub fn callback_url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.config.server.public_url.trim_end_matches('/'),
            path
        )
    }
}
