//! Caching layer: a string key-value store with per-entry expiry.
//!
//! [`Store`] is the seam the resolver depends on. Two backends ship:
//!
//! - [`RedisStore`] for production, over a multiplexed connection manager.
//! - [`MemoryStore`], an in-process map with the same TTL semantics, used in
//!   tests and anywhere a Redis server is not wanted.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{RedisStore, StoreConfig};

/// Errors reported by a [`Store`]. A missing key is not one of them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A key-value store with expiring entries.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value, expiring
    /// after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
}
