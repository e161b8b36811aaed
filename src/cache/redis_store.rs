use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use super::{Store, StoreError};

/// Where and how to reach the Redis server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `host:port`.
    pub address: String,
    pub password: Option<String>,
    /// Logical database index.
    pub db: i64,
}

impl StoreConfig {
    /// Renders the `redis://` connection URL, percent-encoding the password.
    pub fn connection_url(&self) -> String {
        let auth = match &self.password {
            Some(password) => format!(":{}@", utf8_percent_encode(password, NON_ALPHANUMERIC)),
            None => String::new(),
        };
        format!("redis://{auth}{}/{}", self.address, self.db)
    }
}

/// [`Store`] backed by Redis.
///
/// Wraps a [`ConnectionManager`], which multiplexes every request over one
/// connection and reconnects on its own after failures. Cloning is cheap.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Opens the connection described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.connection_url())?;
        let conn = client.get_connection_manager().await?;
        debug!(address = %config.address, db = config.db, "connected to redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }
}
