//! Storage capability required by the rate limiting algorithms.
//!
//! The algorithms never talk to a concrete client. They only need the handful
//! of primitives in [`Store`], so any backend that provides them (in-process,
//! Redis, or anything else with an atomic increment) can be swapped in without
//! changing a single decision.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Errors reported by a [`Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key holds a value of a different type than the operation expects.
    #[error("Key '{key}' holds a value of the wrong type")]
    WrongType { key: String },

    /// The key holds a value that is not a valid integer.
    #[error("Value at '{key}' is not an integer")]
    NotAnInteger { key: String },

    /// Redis client or server errors
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// The minimal set of operations the algorithms need from a shared store.
///
/// All operations act on one flat namespace of string keys. Implementations
/// must make [`Store::incr`] atomic with respect to every other caller sharing
/// the store, including callers in other processes. The window algorithms are
/// only correct because of that guarantee; a backend without a native atomic
/// increment has to emulate it with a compare-and-swap or transaction loop.
///
/// Nothing else needs to be atomic. Failures are returned as-is and never
/// retried here.
#[async_trait]
pub trait Store: Send + Sync {
    /// Increment the integer at `key` by one, creating it at 1 if absent.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Read the string value at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite the value at `key`. Any existing TTL is cleared.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Attach or refresh a TTL on `key`. Missing keys are ignored.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete the given keys, ignoring ones that do not exist.
    async fn del(&self, keys: &[String]) -> Result<(), StoreError>;

    /// List every live key starting with `prefix`.
    ///
    /// Only used by reset and introspection, never on the decision path.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Add `delta` to `field` of the hash at `key`, creating either if absent.
    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    /// Read several fields of the hash at `key`, in order.
    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, StoreError>;
}
