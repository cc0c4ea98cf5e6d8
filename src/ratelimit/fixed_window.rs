//! Fixed window counting.
//!
//! Time is cut into aligned windows of `window` length and each window gets
//! its own counter. Once a window's count passes the limit every further
//! request in that window is denied, however many arrive.

use tracing::trace;

use super::decision::Decision;
use super::key::LimitKey;
use super::policy::Policy;
use crate::store::{Store, StoreError};

/// Count one request against the current window.
pub async fn evaluate(
    store: &dyn Store,
    key: &LimitKey,
    policy: &Policy,
    now_ms: i64,
) -> Result<Decision, StoreError> {
    let limit = policy.limit();
    let window_ms = policy.window_ms();
    let window_start = now_ms.div_euclid(window_ms) * window_ms;
    let window_key = key.with_suffix(window_start);

    let count = store.incr(&window_key).await?;
    if count == 1 {
        // First hit owns the TTL so the counter disappears with its window
        store.expire(&window_key, policy.window()).await?;
    }

    trace!(key = %window_key, count, limit, "Fixed window counted");

    let count = count.max(0) as u64;
    Ok(Decision {
        allowed: count <= limit,
        limit,
        remaining: limit.saturating_sub(count),
        reset_at_ms: window_start + window_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    const START: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn test_counts_up_to_limit_then_denies() {
        let store = MemoryStore::new();
        let key = LimitKey::new("test", "u");
        let policy = Policy::fixed_window(2, Duration::from_secs(10)).unwrap();

        let first = evaluate(&store, &key, &policy, START).await.unwrap();
        let second = evaluate(&store, &key, &policy, START + 1).await.unwrap();
        let third = evaluate(&store, &key, &policy, START + 2).await.unwrap();

        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset_at_ms, START + 10_000);
    }

    #[tokio::test]
    async fn test_window_key_is_aligned() {
        let store = MemoryStore::new();
        let key = LimitKey::new("test", "u");
        let policy = Policy::fixed_window(5, Duration::from_secs(10)).unwrap();

        evaluate(&store, &key, &policy, START + 4_321).await.unwrap();

        let keys = store.keys_with_prefix("test:u").await.unwrap();
        assert_eq!(keys, vec![format!("test:u:{}", START)]);
    }

    #[tokio::test]
    async fn test_new_window_starts_fresh() {
        let store = MemoryStore::new();
        let key = LimitKey::new("test", "u");
        let policy = Policy::fixed_window(1, Duration::from_secs(1)).unwrap();

        evaluate(&store, &key, &policy, START).await.unwrap();
        let denied = evaluate(&store, &key, &policy, START + 999).await.unwrap();
        assert!(!denied.allowed);

        let next = evaluate(&store, &key, &policy, START + 1_000).await.unwrap();
        assert!(next.allowed);
        assert_eq!(next.reset_at_ms, START + 2_000);
    }

    #[tokio::test]
    async fn test_counter_expires_with_window() {
        let clock = Arc::new(ManualClock::new(START));
        let store = MemoryStore::with_clock(clock.clone());
        let key = LimitKey::new("test", "u");
        let policy = Policy::fixed_window(5, Duration::from_secs(10)).unwrap();

        evaluate(&store, &key, &policy, START).await.unwrap();
        assert_eq!(store.len(), 1);

        clock.advance(Duration::from_secs(10));
        assert!(store.is_empty());
    }
}
