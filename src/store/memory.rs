//! In-process store backed by a concurrent hash map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{Store, StoreError};
use crate::ratelimit::{Clock, SystemClock};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    /// Epoch milliseconds after which the slot reads as absent
    expires_at_ms: Option<i64>,
}

impl Slot {
    fn counter() -> Self {
        Self {
            value: Value::Str("0".to_string()),
            expires_at_ms: None,
        }
    }

    fn hash() -> Self {
        Self {
            value: Value::Hash(HashMap::new()),
            expires_at_ms: None,
        }
    }

    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map_or(true, |at| now_ms < at)
    }
}

/// Writes between sweeps of expired keys.
const SWEEP_EVERY: u64 = 256;

/// A [`Store`] that lives inside the current process.
///
/// Increments happen under the map's shard lock, so they are atomic for every
/// task sharing this instance. Limits are only shared between processes if
/// they share a store, so this backend suits single-process deployments and
/// tests. TTLs are checked against the injected [`Clock`] on every access.
///
/// Expired keys are removed when a read finds them, and every
/// `SWEEP_EVERY`th write sweeps the whole map, so identifiers that are never
/// seen again do not accumulate.
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store that expires keys by wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an empty store that expires keys by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            writes: AtomicU64::new(0),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    /// Check whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.is_live(now));
        let purged = before.saturating_sub(self.entries.len());
        trace!(purged, "Purged expired keys");
        purged
    }

    /// Count a write and sweep once enough have happened.
    ///
    /// Must not be called while holding a reference into `entries`.
    fn note_write(&self) {
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.purge_expired();
        }
    }

    fn remove_if_expired(&self, key: &str, now_ms: i64) {
        self.entries.remove_if(key, |_, slot| !slot.is_live(now_ms));
    }

    #[cfg(test)]
    fn raw_len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ttl_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl Store for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.clock.now_ms();
        let result = {
            let mut slot = self
                .entries
                .entry(key.to_string())
                .or_insert_with(Slot::counter);

            if !slot.is_live(now) {
                *slot = Slot::counter();
            }

            match &mut slot.value {
                Value::Str(current) => match current.parse::<i64>() {
                    Ok(count) => {
                        let next = count + 1;
                        *current = next.to_string();
                        Ok(next)
                    }
                    Err(_) => Err(StoreError::NotAnInteger {
                        key: key.to_string(),
                    }),
                },
                Value::Hash(_) => Err(StoreError::WrongType {
                    key: key.to_string(),
                }),
            }
        };
        self.note_write();
        result
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_ms();
        if let Some(slot) = self.entries.get(key) {
            if slot.is_live(now) {
                return match &slot.value {
                    Value::Str(value) => Ok(Some(value.clone())),
                    Value::Hash(_) => Err(StoreError::WrongType {
                        key: key.to_string(),
                    }),
                };
            }
        } else {
            return Ok(None);
        }
        self.remove_if_expired(key, now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at_ms: None,
            },
        );
        self.note_write();
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now_ms();
        if let Some(mut slot) = self.entries.get_mut(key) {
            if slot.is_live(now) {
                slot.expires_at_ms = Some(now.saturating_add(ttl_ms(ttl)));
            }
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now_ms();
        let mut live = Vec::new();
        let mut expired = Vec::new();
        for entry in self.entries.iter() {
            if !entry.key().starts_with(prefix) {
                continue;
            }
            if entry.is_live(now) {
                live.push(entry.key().clone());
            } else {
                expired.push(entry.key().clone());
            }
        }
        for key in &expired {
            self.remove_if_expired(key, now);
        }
        Ok(live)
    }

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let now = self.clock.now_ms();
        let result = {
            let mut slot = self.entries.entry(key.to_string()).or_insert_with(Slot::hash);

            if !slot.is_live(now) {
                *slot = Slot::hash();
            }

            match &mut slot.value {
                Value::Hash(fields) => {
                    let counter = fields.entry(field.to_string()).or_insert(0);
                    *counter += delta;
                    Ok(*counter)
                }
                Value::Str(_) => Err(StoreError::WrongType {
                    key: key.to_string(),
                }),
            }
        };
        self.note_write();
        result
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let now = self.clock.now_ms();
        if let Some(slot) = self.entries.get(key) {
            if slot.is_live(now) {
                return match &slot.value {
                    Value::Hash(values) => Ok(fields
                        .iter()
                        .map(|f| values.get(*f).map(|v| v.to_string()))
                        .collect()),
                    Value::Str(_) => Err(StoreError::WrongType {
                        key: key.to_string(),
                    }),
                };
            }
        } else {
            return Ok(vec![None; fields.len()]);
        }
        self.remove_if_expired(key, now);
        Ok(vec![None; fields.len()])
    }
}
