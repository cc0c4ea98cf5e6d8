//! Redis-backed store.
//!
//! Every process that connects to the same Redis instance shares the same
//! counters. `INCR` and `HINCRBY` are atomic on the server, which is all the
//! window algorithms need.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

use super::{Store, StoreError};

/// A [`Store`] backed by a Redis server.
///
/// Wraps a [`ConnectionManager`], which reconnects on its own. Commands are
/// never retried here; a failed command surfaces as [`StoreError::Redis`].
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis at the given URL (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        debug!("Connected to Redis");
        Ok(Self { connection })
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

/// Escape Redis glob metacharacters so `prefix` only matches itself.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Store for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.incr(key, 1).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        conn.pexpire::<_, ()>(key, millis).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", escape_glob(prefix));
        Ok(conn.keys(pattern).await?)
    }

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.hincr(key, field, delta).await?)
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let mut conn = self.connection.clone();
        let values = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }
}
