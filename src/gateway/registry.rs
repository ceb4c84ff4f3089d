//! Fleet-wide record of which user holds which connection.
//!
//! Entries live in the shared key-value store so any process can answer
//! "who is behind connection X". They carry a generous TTL instead of a
//! keepalive: normal disconnects delete the entry, the TTL only mops up
//! after crashed processes.

use std::sync::Arc;

use crate::error::StoreError;
use crate::store::KeyValueStore;

/// Registry entries expire after a day if the owning process never
/// deletes them.
pub const REGISTRY_TTL_SECS: u64 = 24 * 3600;

fn registry_key(connection_id: &str) -> String {
    format!("realtime:conn:{connection_id}")
}

pub struct ConnectionRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        ConnectionRegistry { store }
    }

    /// Records that `connection_id` belongs to `user_id`. The TTL is set
    /// once at registration and never refreshed.
    pub async fn register(&self, connection_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.store
            .set_ex(&registry_key(connection_id), user_id, REGISTRY_TTL_SECS)
            .await
    }

    pub async fn lookup(&self, connection_id: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&registry_key(connection_id)).await
    }

    pub async fn deregister(&self, connection_id: &str) -> Result<(), StoreError> {
        self.store.del(&registry_key(connection_id)).await
    }
}
