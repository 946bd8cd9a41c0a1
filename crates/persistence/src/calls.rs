//! Call record persistence using ScyllaDB

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use call_assistant_core::{
    CallDirection, CallRecord, CallStatus, Finalization, NotificationRecord, RecordingRef, Turn,
    TurnRole,
};

use crate::client::{first_row, lwt_applied, require_applied};
use crate::{PersistenceError, ScyllaClient};

/// Call record store trait
#[async_trait]
pub trait CallRecordStore: Send + Sync {
    /// Insert a new record. Returns false when a record with the same
    /// call id already exists (gateway retries of the incoming webhook).
    async fn create(&self, record: &CallRecord) -> Result<bool, PersistenceError>;

    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, PersistenceError>;

    /// Append turns to the transcript, preserving order
    async fn append_transcript(&self, call_id: &str, turns: &[Turn])
        -> Result<(), PersistenceError>;

    /// Progress update from the gateway. Ignored once the call is finalized.
    async fn update_status(
        &self,
        call_id: &str,
        status: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<(), PersistenceError>;

    /// Conditional finalization: writes status, end time, duration and
    /// summary only if the record is not finalized yet. Returns whether
    /// this caller won.
    async fn finalize(
        &self,
        call_id: &str,
        finalization: &Finalization,
    ) -> Result<bool, PersistenceError>;

    async fn mark_lead_captured(&self, call_id: &str, lead_id: Uuid)
        -> Result<(), PersistenceError>;

    async fn attach_recording(
        &self,
        call_id: &str,
        recording: &RecordingRef,
    ) -> Result<(), PersistenceError>;

    async fn record_notification(
        &self,
        call_id: &str,
        notification: &NotificationRecord,
    ) -> Result<(), PersistenceError>;
}

/// ScyllaDB implementation of the call record store
#[derive(Clone)]
pub struct ScyllaCallStore {
    client: ScyllaClient,
}

impl ScyllaCallStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn load_transcript(&self, call_id: &str) -> Result<Vec<Turn>, PersistenceError> {
        let query = format!(
            "SELECT role, text, spoken_at FROM {}.call_transcripts WHERE call_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (call_id,)).await?;

        let mut turns = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (role, text, spoken_at): (String, String, i64) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                turns.push(Turn {
                    role: TurnRole::from_str(&role),
                    text,
                    timestamp: DateTime::from_timestamp_millis(spoken_at).unwrap_or_else(Utc::now),
                });
            }
        }

        Ok(turns)
    }
}

#[async_trait]
impl CallRecordStore for ScyllaCallStore {
    async fn create(&self, record: &CallRecord) -> Result<bool, PersistenceError> {
        let query = format!(
            "INSERT INTO {}.calls (
                call_id, business_id, from_number, to_number, direction, status,
                started_at, finalized, lead_captured
            ) VALUES (?, ?, ?, ?, ?, ?, ?, false, false) IF NOT EXISTS",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(
                query,
                (
                    &record.call_id,
                    &record.business_id,
                    &record.from_number,
                    &record.to_number,
                    record.direction.as_str(),
                    record.status.as_str(),
                    record.started_at.timestamp_millis(),
                ),
            )
            .await?;

        let created = lwt_applied(result)?;
        if created {
            tracing::info!(
                call_id = %record.call_id,
                business_id = %record.business_id,
                "Call record created in ScyllaDB"
            );
        }
        Ok(created)
    }

    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, PersistenceError> {
        let query = format!(
            "SELECT call_id, business_id, from_number, to_number, direction, status,
                    started_at, ended_at, duration_secs, conversation_summary,
                    lead_captured, lead_id, notification_json, recording_json
             FROM {}.calls WHERE call_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (call_id,)).await?;

        let Some(row) = first_row(result) else {
            return Ok(None);
        };

        let (
            call_id,
            business_id,
            from_number,
            to_number,
            direction,
            status,
            started_at,
            ended_at,
            duration_secs,
            conversation_summary,
            lead_captured,
            lead_id,
            notification_json,
            recording_json,
        ): (
            String,
            String,
            Option<String>,
            Option<String>,
            String,
            String,
            i64,
            Option<i64>,
            Option<i32>,
            Option<String>,
            Option<bool>,
            Option<Uuid>,
            Option<String>,
            Option<String>,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let notification = notification_json
            .map(|json| serde_json::from_str::<NotificationRecord>(&json))
            .transpose()?;
        let recording = recording_json
            .map(|json| serde_json::from_str::<RecordingRef>(&json))
            .transpose()?;

        let transcript = self.load_transcript(&call_id).await?;

        Ok(Some(CallRecord {
            call_id,
            business_id,
            from_number,
            to_number,
            direction: CallDirection::from_str(&direction),
            status: CallStatus::parse(&status).unwrap_or_default(),
            started_at: DateTime::from_timestamp_millis(started_at).unwrap_or_else(Utc::now),
            ended_at: ended_at.and_then(DateTime::from_timestamp_millis),
            duration_secs: duration_secs.map(|d| d.max(0) as u32),
            transcript,
            conversation_summary,
            lead_captured: lead_captured.unwrap_or(false),
            lead_id,
            notification,
            recording,
        }))
    }

    async fn append_transcript(
        &self,
        call_id: &str,
        turns: &[Turn],
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.call_transcripts (call_id, seq, role, text, spoken_at)
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        for (i, turn) in turns.iter().enumerate() {
            // Microsecond timestamp with room for turns that share one
            let seq = turn.timestamp.timestamp_micros() * 1000 + i as i64;
            self.client
                .session()
                .query_unpaged(
                    query.clone(),
                    (
                        call_id,
                        seq,
                        turn.role.as_str(),
                        &turn.text,
                        turn.timestamp.timestamp_millis(),
                    ),
                )
                .await?;
        }

        Ok(())
    }

    async fn update_status(
        &self,
        call_id: &str,
        status: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.calls SET status = ?, duration_secs = ?
             WHERE call_id = ? IF finalized = false",
            self.client.keyspace()
        );

        let duration = duration_secs.map(|d| d as i32);
        let result = self
            .client
            .session()
            .query_unpaged(query, (status.as_str(), duration, call_id))
            .await?;

        if !lwt_applied(result)? {
            tracing::debug!(call_id = %call_id, status = %status, "Status update skipped, call finalized or unknown");
        }

        Ok(())
    }

    async fn finalize(
        &self,
        call_id: &str,
        finalization: &Finalization,
    ) -> Result<bool, PersistenceError> {
        let query = format!(
            "UPDATE {}.calls SET status = ?, ended_at = ?, duration_secs = ?,
                    conversation_summary = ?, finalized = true
             WHERE call_id = ? IF finalized = false",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(
                query,
                (
                    finalization.status.as_str(),
                    finalization.ended_at.timestamp_millis(),
                    finalization.duration_secs as i32,
                    &finalization.summary,
                    call_id,
                ),
            )
            .await?;

        let applied = lwt_applied(result)?;
        tracing::info!(call_id = %call_id, applied, "Call finalization attempted");
        Ok(applied)
    }

    async fn mark_lead_captured(
        &self,
        call_id: &str,
        lead_id: Uuid,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.calls SET lead_captured = true, lead_id = ?
             WHERE call_id = ? IF EXISTS",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (lead_id, call_id))
            .await?;

        require_applied(result, call_id)
    }

    async fn attach_recording(
        &self,
        call_id: &str,
        recording: &RecordingRef,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.calls SET recording_json = ? WHERE call_id = ? IF EXISTS",
            self.client.keyspace()
        );

        let json = serde_json::to_string(recording)?;
        let result = self.client.session().query_unpaged(query, (json, call_id)).await?;

        require_applied(result, call_id)
    }

    async fn record_notification(
        &self,
        call_id: &str,
        notification: &NotificationRecord,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.calls SET notification_json = ? WHERE call_id = ? IF EXISTS",
            self.client.keyspace()
        );

        let json = serde_json::to_string(notification)?;
        let result = self.client.session().query_unpaged(query, (json, call_id)).await?;

        require_applied(result, call_id)
    }
}
