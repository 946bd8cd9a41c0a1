//! ScyllaDB schema creation

use scylla::Session;

use crate::error::PersistenceError;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Call records. `finalized` guards the one-time completion write.
    let calls_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.calls (
            call_id TEXT,
            business_id TEXT,
            from_number TEXT,
            to_number TEXT,
            direction TEXT,
            status TEXT,
            started_at BIGINT,
            ended_at BIGINT,
            duration_secs INT,
            conversation_summary TEXT,
            finalized BOOLEAN,
            lead_captured BOOLEAN,
            lead_id UUID,
            notification_json TEXT,
            recording_json TEXT,
            PRIMARY KEY (call_id)
        )
    "#,
        keyspace
    );

    session.query_unpaged(calls_table, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create calls table: {}", e))
    })?;

    // Append-only transcript, one row per turn
    let transcripts_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.call_transcripts (
            call_id TEXT,
            seq BIGINT,
            role TEXT,
            text TEXT,
            spoken_at BIGINT,
            PRIMARY KEY ((call_id), seq)
        ) WITH CLUSTERING ORDER BY (seq ASC)
    "#,
        keyspace
    );

    session.query_unpaged(transcripts_table, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create call_transcripts table: {}", e))
    })?;

    // Leads. Summary and notification live in their own columns so the
    // completion pipeline can update them without rewriting the lead.
    let leads_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.leads (
            lead_id UUID,
            business_id TEXT,
            lead_json TEXT,
            ai_summary_json TEXT,
            notification_json TEXT,
            updated_at BIGINT,
            PRIMARY KEY (lead_id)
        )
    "#,
        keyspace
    );

    session.query_unpaged(leads_table, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create leads table: {}", e))
    })?;

    // One lead per call, claimed with IF NOT EXISTS
    let leads_by_call_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.leads_by_call (
            business_id TEXT,
            call_id TEXT,
            lead_id UUID,
            PRIMARY KEY ((business_id, call_id))
        )
    "#,
        keyspace
    );

    session.query_unpaged(leads_by_call_table, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create leads_by_call table: {}", e))
    })?;

    // Phone de-duplication index
    let leads_by_phone_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.leads_by_phone (
            business_id TEXT,
            phone_key TEXT,
            lead_id UUID,
            PRIMARY KEY ((business_id, phone_key))
        )
    "#,
        keyspace
    );

    session.query_unpaged(leads_by_phone_table, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create leads_by_phone table: {}", e))
    })?;

    tracing::info!("All tables created successfully");
    Ok(())
}
