use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;

/// Abstraction over the key-value store shared by all server processes.
///
/// Backed by Redis in production and an in-memory map in tests.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and single-process deployments)
// ---------------------------------------------------------------------------

/// In-memory store with lazy expiry: entries past their deadline are dropped
/// on read.
pub struct MemoryStore {
    data: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let deadline = Instant::now() + Duration::from_secs(ttl_secs);
        self.data
            .lock()
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut data = self.data.lock();
        let value = match data.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Some(value.clone()),
            _ => None,
        };
        if value.is_none() {
            data.remove(key);
        }
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.data.lock().remove(key);
        Ok(())
    }
}
