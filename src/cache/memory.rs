use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Store, StoreError};

/// In-process [`Store`] with lazy expiry.
///
/// Expired entries are dropped when they are next read, and every write sweeps
/// out all entries that have expired, so the map stays bounded by the queries
/// seen within one TTL. Deadlines use [`tokio::time::Instant`], so paused test
/// clocks apply.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            None => return Ok(None),
            Some((value, deadline)) if Instant::now() < *deadline => {
                return Ok(Some(value.clone()));
            }
            Some(_) => {}
        }
        entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.retain(|_, (_, deadline)| now < *deadline);
        entries.insert(key.to_owned(), (value, now + ttl));
        Ok(())
    }
}
