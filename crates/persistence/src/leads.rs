//! Lead persistence using ScyllaDB

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use call_assistant_core::{AiSummary, Lead, NotificationRecord};

use crate::client::{first_row, lwt_applied, require_applied};
use crate::{PersistenceError, ScyllaClient};

/// Result of claiming a call for a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClaim {
    /// This lead now owns the call
    Claimed,
    /// Another lead already owns the call
    AlreadyClaimed(Uuid),
}

/// Lead store trait
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get(&self, lead_id: Uuid) -> Result<Option<Lead>, PersistenceError>;

    /// Lead that owns `call_id`, if any
    async fn find_by_call(
        &self,
        business_id: &str,
        call_id: &str,
    ) -> Result<Option<Lead>, PersistenceError>;

    /// Lead for a normalized phone key within one business
    async fn find_by_phone(
        &self,
        business_id: &str,
        phone_key: &str,
    ) -> Result<Option<Lead>, PersistenceError>;

    /// Atomically bind `call_id` to `lead_id`. At most one lead ever owns a call.
    async fn claim_call(
        &self,
        business_id: &str,
        call_id: &str,
        lead_id: Uuid,
    ) -> Result<CallClaim, PersistenceError>;

    /// Upsert the lead and its phone index entry
    async fn save(&self, lead: &Lead) -> Result<(), PersistenceError>;

    async fn set_summary(&self, lead_id: Uuid, summary: &AiSummary)
        -> Result<(), PersistenceError>;

    async fn set_notification(
        &self,
        lead_id: Uuid,
        notification: &NotificationRecord,
    ) -> Result<(), PersistenceError>;
}

/// ScyllaDB implementation of the lead store
#[derive(Clone)]
pub struct ScyllaLeadStore {
    client: ScyllaClient,
}

impl ScyllaLeadStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn lookup_index(
        &self,
        table: &str,
        key_column: &str,
        business_id: &str,
        key: &str,
    ) -> Result<Option<Uuid>, PersistenceError> {
        let query = format!(
            "SELECT lead_id FROM {}.{} WHERE business_id = ? AND {} = ?",
            self.client.keyspace(),
            table,
            key_column
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (business_id, key))
            .await?;

        match first_row(result) {
            Some(row) => {
                let (lead_id,): (Uuid,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                Ok(Some(lead_id))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LeadStore for ScyllaLeadStore {
    async fn get(&self, lead_id: Uuid) -> Result<Option<Lead>, PersistenceError> {
        let query = format!(
            "SELECT lead_json, ai_summary_json, notification_json FROM {}.leads WHERE lead_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (lead_id,)).await?;

        let Some(row) = first_row(result) else {
            return Ok(None);
        };

        let (lead_json, summary_json, notification_json): (
            Option<String>,
            Option<String>,
            Option<String>,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        // A summary/notification update may land before the lead row itself
        let Some(lead_json) = lead_json else {
            return Ok(None);
        };

        let mut lead: Lead = serde_json::from_str(&lead_json)?;
        if let Some(json) = summary_json {
            lead.ai_summary = serde_json::from_str(&json)?;
        }
        if let Some(json) = notification_json {
            lead.notification = Some(serde_json::from_str(&json)?);
        }

        Ok(Some(lead))
    }

    async fn find_by_call(
        &self,
        business_id: &str,
        call_id: &str,
    ) -> Result<Option<Lead>, PersistenceError> {
        match self
            .lookup_index("leads_by_call", "call_id", business_id, call_id)
            .await?
        {
            Some(lead_id) => self.get(lead_id).await,
            None => Ok(None),
        }
    }

    async fn find_by_phone(
        &self,
        business_id: &str,
        phone_key: &str,
    ) -> Result<Option<Lead>, PersistenceError> {
        match self
            .lookup_index("leads_by_phone", "phone_key", business_id, phone_key)
            .await?
        {
            Some(lead_id) => self.get(lead_id).await,
            None => Ok(None),
        }
    }

    async fn claim_call(
        &self,
        business_id: &str,
        call_id: &str,
        lead_id: Uuid,
    ) -> Result<CallClaim, PersistenceError> {
        let query = format!(
            "INSERT INTO {}.leads_by_call (business_id, call_id, lead_id)
             VALUES (?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (business_id, call_id, lead_id))
            .await?;

        if lwt_applied(result)? {
            return Ok(CallClaim::Claimed);
        }

        let winner = self
            .lookup_index("leads_by_call", "call_id", business_id, call_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("claim for call {}", call_id)))?;

        tracing::info!(call_id = %call_id, winner = %winner, "Call already claimed by another lead");
        Ok(CallClaim::AlreadyClaimed(winner))
    }

    async fn save(&self, lead: &Lead) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.leads SET business_id = ?, lead_json = ?, updated_at = ? WHERE lead_id = ?",
            self.client.keyspace()
        );

        let json = serde_json::to_string(lead)?;
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &lead.business_id,
                    json,
                    lead.updated_at.timestamp_millis(),
                    lead.id,
                ),
            )
            .await?;

        let index = format!(
            "INSERT INTO {}.leads_by_phone (business_id, phone_key, lead_id) VALUES (?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(index, (&lead.business_id, &lead.phone_key, lead.id))
            .await?;

        tracing::info!(
            lead_id = %lead.id,
            business_id = %lead.business_id,
            calls = lead.call_ids.len(),
            "Lead saved in ScyllaDB"
        );

        Ok(())
    }

    async fn set_summary(
        &self,
        lead_id: Uuid,
        summary: &AiSummary,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.leads SET ai_summary_json = ?, updated_at = ? WHERE lead_id = ? IF EXISTS",
            self.client.keyspace()
        );

        let json = serde_json::to_string(summary)?;
        let result = self
            .client
            .session()
            .query_unpaged(query, (json, Utc::now().timestamp_millis(), lead_id))
            .await?;

        require_applied(result, &lead_id.to_string())
    }

    async fn set_notification(
        &self,
        lead_id: Uuid,
        notification: &NotificationRecord,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.leads SET notification_json = ?, updated_at = ? WHERE lead_id = ? IF EXISTS",
            self.client.keyspace()
        );

        let json = serde_json::to_string(notification)?;
        let result = self
            .client
            .session()
            .query_unpaged(query, (json, Utc::now().timestamp_millis(), lead_id))
            .await?;

        require_applied(result, &lead_id.to_string())
    }
}
