//! In-memory stores used when ScyllaDB persistence is disabled, and in tests.
//!
//! Conditional writes hold the map entry lock across check and update, which
//! gives the same at-most-once guarantees as the LWT-based Scylla stores.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use call_assistant_core::{
    AiSummary, CallRecord, CallStatus, Finalization, Lead, NotificationRecord, RecordingRef, Turn,
};

use crate::calls::CallRecordStore;
use crate::leads::{CallClaim, LeadStore};
use crate::PersistenceError;

/// Call records keyed by call id
#[derive(Default)]
pub struct InMemoryCallStore {
    records: DashMap<String, CallRecord>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn with_record<F>(&self, call_id: &str, update: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut CallRecord),
    {
        let mut record = self
            .records
            .get_mut(call_id)
            .ok_or_else(|| PersistenceError::NotFound(call_id.to_string()))?;
        update(&mut record);
        Ok(())
    }
}

#[async_trait]
impl CallRecordStore for InMemoryCallStore {
    async fn create(&self, record: &CallRecord) -> Result<bool, PersistenceError> {
        match self.records.entry(record.call_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, PersistenceError> {
        Ok(self.records.get(call_id).map(|r| r.clone()))
    }

    async fn append_transcript(
        &self,
        call_id: &str,
        turns: &[Turn],
    ) -> Result<(), PersistenceError> {
        self.with_record(call_id, |record| record.transcript.extend_from_slice(turns))
    }

    async fn update_status(
        &self,
        call_id: &str,
        status: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<(), PersistenceError> {
        if let Some(mut record) = self.records.get_mut(call_id) {
            if !record.is_finalized() {
                record.status = status;
                if duration_secs.is_some() {
                    record.duration_secs = duration_secs;
                }
            }
        }
        Ok(())
    }

    async fn finalize(
        &self,
        call_id: &str,
        finalization: &Finalization,
    ) -> Result<bool, PersistenceError> {
        let Some(mut record) = self.records.get_mut(call_id) else {
            return Ok(false);
        };
        if record.is_finalized() {
            return Ok(false);
        }
        record.status = finalization.status;
        record.ended_at = Some(finalization.ended_at);
        record.duration_secs = Some(finalization.duration_secs);
        record.conversation_summary = Some(finalization.summary.clone());
        Ok(true)
    }

    async fn mark_lead_captured(
        &self,
        call_id: &str,
        lead_id: Uuid,
    ) -> Result<(), PersistenceError> {
        self.with_record(call_id, |record| {
            record.lead_captured = true;
            record.lead_id = Some(lead_id);
        })
    }

    async fn attach_recording(
        &self,
        call_id: &str,
        recording: &RecordingRef,
    ) -> Result<(), PersistenceError> {
        self.with_record(call_id, |record| record.recording = Some(recording.clone()))
    }

    async fn record_notification(
        &self,
        call_id: &str,
        notification: &NotificationRecord,
    ) -> Result<(), PersistenceError> {
        self.with_record(call_id, |record| {
            record.notification = Some(notification.clone())
        })
    }
}

/// Leads with call and phone indexes
#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: DashMap<Uuid, Lead>,
    /// (business_id, call_id) -> lead
    by_call: DashMap<(String, String), Uuid>,
    /// (business_id, phone_key) -> lead
    by_phone: DashMap<(String, String), Uuid>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    /// All leads of one business
    pub fn for_business(&self, business_id: &str) -> Vec<Lead> {
        self.leads
            .iter()
            .filter(|l| l.business_id == business_id)
            .map(|l| l.clone())
            .collect()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn get(&self, lead_id: Uuid) -> Result<Option<Lead>, PersistenceError> {
        Ok(self.leads.get(&lead_id).map(|l| l.clone()))
    }

    async fn find_by_call(
        &self,
        business_id: &str,
        call_id: &str,
    ) -> Result<Option<Lead>, PersistenceError> {
        let key = (business_id.to_string(), call_id.to_string());
        let lead_id = self.by_call.get(&key).map(|id| *id);
        match lead_id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    async fn find_by_phone(
        &self,
        business_id: &str,
        phone_key: &str,
    ) -> Result<Option<Lead>, PersistenceError> {
        let key = (business_id.to_string(), phone_key.to_string());
        let lead_id = self.by_phone.get(&key).map(|id| *id);
        match lead_id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    async fn claim_call(
        &self,
        business_id: &str,
        call_id: &str,
        lead_id: Uuid,
    ) -> Result<CallClaim, PersistenceError> {
        match self
            .by_call
            .entry((business_id.to_string(), call_id.to_string()))
        {
            Entry::Occupied(existing) if *existing.get() != lead_id => {
                Ok(CallClaim::AlreadyClaimed(*existing.get()))
            }
            Entry::Occupied(_) => Ok(CallClaim::Claimed),
            Entry::Vacant(slot) => {
                slot.insert(lead_id);
                Ok(CallClaim::Claimed)
            }
        }
    }

    async fn save(&self, lead: &Lead) -> Result<(), PersistenceError> {
        self.leads.insert(lead.id, lead.clone());
        self.by_phone.insert(
            (lead.business_id.clone(), lead.phone_key.clone()),
            lead.id,
        );
        Ok(())
    }

    async fn set_summary(
        &self,
        lead_id: Uuid,
        summary: &AiSummary,
    ) -> Result<(), PersistenceError> {
        let mut lead = self
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| PersistenceError::NotFound(lead_id.to_string()))?;
        lead.ai_summary = summary.clone();
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn set_notification(
        &self,
        lead_id: Uuid,
        notification: &NotificationRecord,
    ) -> Result<(), PersistenceError> {
        let mut lead = self
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| PersistenceError::NotFound(lead_id.to_string()))?;
        lead.notification = Some(notification.clone());
        lead.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn finalization(summary: &str) -> Finalization {
        Finalization {
            status: CallStatus::Completed,
            ended_at: Utc::now(),
            duration_secs: 30,
            summary: summary.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = InMemoryCallStore::new();
        let record = CallRecord::new("CA1", "acme");

        assert!(store.create(&record).await.unwrap());
        assert!(!store.create(&record).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_transcript_appends_in_order() {
        let store = InMemoryCallStore::new();
        store.create(&CallRecord::new("CA1", "acme")).await.unwrap();

        store
            .append_transcript("CA1", &[Turn::assistant("Your name?"), Turn::caller("Sam")])
            .await
            .unwrap();
        store
            .append_transcript("CA1", &[Turn::assistant("Your number?")])
            .await
            .unwrap();

        let record = store.get("CA1").await.unwrap().unwrap();
        let texts: Vec<_> = record.transcript.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Your name?", "Sam", "Your number?"]);

        assert!(matches!(
            store.append_transcript("missing", &[Turn::caller("hi")]).await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let store = InMemoryCallStore::new();
        store.create(&CallRecord::new("CA1", "acme")).await.unwrap();

        assert!(store.finalize("CA1", &finalization("first")).await.unwrap());
        assert!(!store.finalize("CA1", &finalization("second")).await.unwrap());

        let record = store.get("CA1").await.unwrap().unwrap();
        assert_eq!(record.conversation_summary.as_deref(), Some("first"));
        assert!(record.is_finalized());

        // Late progress updates do not reopen the call
        store
            .update_status("CA1", CallStatus::InProgress, None)
            .await
            .unwrap();
        let record = store.get("CA1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_finalize_single_winner() {
        let store = Arc::new(InMemoryCallStore::new());
        store.create(&CallRecord::new("CA1", "acme")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .finalize("CA1", &finalization(&format!("summary {i}")))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_finalize_unknown_call() {
        let store = InMemoryCallStore::new();
        assert!(!store.finalize("nope", &finalization("x")).await.unwrap());
    }

    #[tokio::test]
    async fn test_attachments_require_existing_call() {
        let store = InMemoryCallStore::new();
        let recording = RecordingRef {
            url: "https://media.example.com/RE1".into(),
            recording_id: Some("RE1".into()),
            duration_secs: Some(12),
        };

        assert!(matches!(
            store.attach_recording("ghost", &recording).await,
            Err(PersistenceError::NotFound(id)) if id == "ghost"
        ));
        assert!(matches!(
            store.mark_lead_captured("ghost", Uuid::new_v4()).await,
            Err(PersistenceError::NotFound(_))
        ));
        assert!(matches!(
            store
                .record_notification("ghost", &NotificationRecord::sent(vec![]))
                .await,
            Err(PersistenceError::NotFound(_))
        ));
        // No row springs into existence
        assert!(store.get("ghost").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_claim_call_single_owner() {
        let store = InMemoryLeadStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert_eq!(store.claim_call("acme", "CA1", first).await.unwrap(), CallClaim::Claimed);
        assert_eq!(store.claim_call("acme", "CA1", first).await.unwrap(), CallClaim::Claimed);
        assert_eq!(
            store.claim_call("acme", "CA1", second).await.unwrap(),
            CallClaim::AlreadyClaimed(first)
        );
        // Other business, same call id
        assert_eq!(store.claim_call("bravo", "CA1", second).await.unwrap(), CallClaim::Claimed);
    }

    #[tokio::test]
    async fn test_lead_indexes() {
        let store = InMemoryLeadStore::new();
        let lead = Lead::new("acme", "CA1", "+1 555 123 4567").unwrap();
        store.claim_call("acme", "CA1", lead.id).await.unwrap();
        store.save(&lead).await.unwrap();

        let by_phone = store.find_by_phone("acme", "5551234567").await.unwrap().unwrap();
        assert_eq!(by_phone.id, lead.id);
        assert!(store.find_by_phone("bravo", "5551234567").await.unwrap().is_none());

        let by_call = store.find_by_call("acme", "CA1").await.unwrap().unwrap();
        assert_eq!(by_call.id, lead.id);
    }

    #[tokio::test]
    async fn test_summary_and_notification_updates() {
        let store = InMemoryLeadStore::new();
        let lead = Lead::new("acme", "CA1", "5551234567").unwrap();
        store.save(&lead).await.unwrap();

        let summary = AiSummary {
            text: Some("Wants a quote".into()),
            status: call_assistant_core::SummaryStatus::Success,
            ..Default::default()
        };
        store.set_summary(lead.id, &summary).await.unwrap();
        store
            .set_notification(lead.id, &NotificationRecord::failed("smtp down"))
            .await
            .unwrap();

        let stored = store.get(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.ai_summary.text.as_deref(), Some("Wants a quote"));
        assert_eq!(
            stored.notification.unwrap().status,
            call_assistant_core::NotificationStatus::Failed
        );

        assert!(store.set_summary(Uuid::new_v4(), &summary).await.is_err());
    }
}
