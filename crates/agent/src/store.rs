//! Keyed registry of live call sessions

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use call_assistant_core::CallSession;

use crate::AgentError;

/// Per-call dialogue state, keyed by call identifier.
///
/// Turns within one call are serialized by the gateway, so implementations
/// only need per-key atomicity for `create` and `update`.
pub trait ConversationStore: Send + Sync {
    fn get(&self, call_id: &str) -> Result<Option<CallSession>, AgentError>;

    /// Insert or replace
    fn set(&self, session: CallSession) -> Result<(), AgentError>;

    /// Replace only while a session exists for the call. Returns false
    /// when it was already removed, e.g. by call completion.
    fn update(&self, session: CallSession) -> Result<bool, AgentError>;

    fn delete(&self, call_id: &str) -> Result<Option<CallSession>, AgentError>;

    /// Insert only when no session exists for the call. Returns false when
    /// one already does.
    fn create(&self, session: CallSession) -> Result<bool, AgentError>;

    /// Number of live sessions
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store
#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: DashMap<String, CallSession>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, call_id: &str) -> Result<Option<CallSession>, AgentError> {
        Ok(self.sessions.get(call_id).map(|s| s.clone()))
    }

    fn set(&self, session: CallSession) -> Result<(), AgentError> {
        self.sessions.insert(session.call_id.clone(), session);
        Ok(())
    }

    fn update(&self, session: CallSession) -> Result<bool, AgentError> {
        match self.sessions.get_mut(&session.call_id) {
            Some(mut slot) => {
                *slot = session;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, call_id: &str) -> Result<Option<CallSession>, AgentError> {
        Ok(self.sessions.remove(call_id).map(|(_, s)| s))
    }

    fn create(&self, session: CallSession) -> Result<bool, AgentError> {
        match self.sessions.entry(session.call_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(true)
            }
        }
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
