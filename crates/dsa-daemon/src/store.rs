//! Connection-scoped server state.
//!
//! Other parts of the DSA (paged results, pending chained operations,
//! abandon bookkeeping) may keep state keyed by a connection identifier.
//! When a connection is torn down, [`ConnectionStore::delete_connection_state`]
//! is called exactly once to release it. Failure is logged by the caller and
//! does not stop the rest of the teardown.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the connection store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store is unreachable.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },

    /// The delete was attempted but failed.
    #[error("failed to delete state for connection {connection_id}: {reason}")]
    DeleteFailed {
        /// Connection whose state could not be deleted.
        connection_id: String,
        /// Description of the failure.
        reason: String,
    },
}

/// Storage of connection-scoped state.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Deletes everything stored under `connection_id`.
    ///
    /// Returns the number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing store fails.
    async fn delete_connection_state(&self, connection_id: &str) -> Result<usize, StoreError>;
}

/// In-memory connection store.
///
/// Records are opaque strings grouped by connection.
#[derive(Debug, Default)]
pub struct InMemoryConnectionStore {
    records: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryConnectionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one record under a connection.
    pub fn insert(&self, connection_id: impl Into<String>, record: impl Into<String>) {
        self.records
            .write()
            .expect("lock poisoned")
            .entry(connection_id.into())
            .or_default()
            .push(record.into());
    }

    /// Returns the number of records held for a connection.
    #[must_use]
    pub fn record_count(&self, connection_id: &str) -> usize {
        self.records
            .read()
            .expect("lock poisoned")
            .get(connection_id)
            .map_or(0, Vec::len)
    }

    /// Returns `true` if any record is held for the connection.
    #[must_use]
    pub fn contains(&self, connection_id: &str) -> bool {
        self.records
            .read()
            .expect("lock poisoned")
            .contains_key(connection_id)
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn delete_connection_state(&self, connection_id: &str) -> Result<usize, StoreError> {
        let removed = self
            .records
            .write()
            .expect("lock poisoned")
            .remove(connection_id);
        Ok(removed.map_or(0, |records| records.len()))
    }
}
