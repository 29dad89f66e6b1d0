use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ApiError;

/// Abstraction over the key-value store shared with the auth service, which
/// writes access tokens and connection tickets that this service consumes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    async fn del(&self, key: &str) -> Result<(), ApiError>;
    /// Atomically read and delete a key (single-use values).
    async fn take(&self, key: &str) -> Result<Option<String>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (single process / tests)
// ---------------------------------------------------------------------------

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        data.retain(|_, e| e.is_live(now));
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let now = Instant::now();
        Ok(self
            .data
            .lock()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), ApiError> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, ApiError> {
        let now = Instant::now();
        Ok(self
            .data
            .lock()
            .remove(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }
}
