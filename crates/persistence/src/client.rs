//! ScyllaDB client and connection management

use std::sync::Arc;

use scylla::frame::response::result::{CqlValue, Row};
use scylla::{QueryResult, Session, SessionBuilder};

use call_assistant_config::PersistenceConfig;

use crate::error::PersistenceError;
use crate::schema;

/// ScyllaDB configuration
#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self::from(&PersistenceConfig::default())
    }
}

impl From<&PersistenceConfig> for ScyllaConfig {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            hosts: config.scylla_hosts.clone(),
            keyspace: config.keyspace.clone(),
            replication_factor: config.replication_factor.max(1),
        }
    }
}

/// ScyllaDB client wrapper
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: ScyllaConfig,
}

impl ScyllaClient {
    /// Connect to ScyllaDB cluster
    pub async fn connect(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connecting to ScyllaDB");

        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await?;

        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }

    /// Ensure keyspace and tables exist
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        schema::create_keyspace(
            &self.session,
            &self.config.keyspace,
            self.config.replication_factor,
        )
        .await?;
        schema::create_tables(&self.session, &self.config.keyspace).await?;
        tracing::info!(keyspace = %self.config.keyspace, "Schema ensured");
        Ok(())
    }

    /// Get the underlying session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get keyspace name
    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }
}

/// First row of a result, if any
pub(crate) fn first_row(result: QueryResult) -> Option<Row> {
    result.rows.and_then(|rows| rows.into_iter().next())
}

/// Outcome of a lightweight transaction: the `[applied]` column comes first
pub(crate) fn lwt_applied(result: QueryResult) -> Result<bool, PersistenceError> {
    let row = first_row(result)
        .ok_or_else(|| PersistenceError::InvalidData("LWT returned no rows".to_string()))?;
    match row.columns.first() {
        Some(Some(CqlValue::Boolean(applied))) => Ok(*applied),
        other => Err(PersistenceError::InvalidData(format!(
            "Unexpected [applied] column: {:?}",
            other
        ))),
    }
}

/// Conditional `IF EXISTS` write: not applied means no row for `id`
pub(crate) fn require_applied(result: QueryResult, id: &str) -> Result<(), PersistenceError> {
    if lwt_applied(result)? {
        Ok(())
    } else {
        Err(PersistenceError::NotFound(id.to_string()))
    }
}
