//! ScyllaDB persistence layer for the call assistant
//!
//! Provides persistent storage for:
//! - Call records with append-only transcripts and one-time finalization
//! - Leads with per-call ownership and phone de-duplication indexes
//!
//! When persistence is disabled the in-memory stores give the same
//! conditional-write guarantees within one process.

pub mod calls;
pub mod client;
pub mod error;
pub mod leads;
pub mod memory;
pub mod schema;

use std::sync::Arc;

pub use calls::{CallRecordStore, ScyllaCallStore};
pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use leads::{CallClaim, LeadStore, ScyllaLeadStore};
pub use memory::{InMemoryCallStore, InMemoryLeadStore};

/// Initialize the persistence layer with ScyllaDB
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        calls: Arc::new(ScyllaCallStore::new(client.clone())),
        leads: Arc::new(ScyllaLeadStore::new(client)),
        backend: StorageBackend::Scylla,
    })
}

/// Which backend is serving the stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Scylla,
    InMemory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scylla => "scylla",
            Self::InMemory => "in_memory",
        }
    }
}

/// Combined persistence layer
#[derive(Clone)]
pub struct PersistenceLayer {
    pub calls: Arc<dyn CallRecordStore>,
    pub leads: Arc<dyn LeadStore>,
    pub backend: StorageBackend,
}

impl PersistenceLayer {
    /// Process-local stores
    pub fn in_memory() -> Self {
        Self {
            calls: Arc::new(InMemoryCallStore::new()),
            leads: Arc::new(InMemoryLeadStore::new()),
            backend: StorageBackend::InMemory,
        }
    }
}
