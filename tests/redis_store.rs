//! Integration tests for the Redis store.
//!
//! These tests require a Redis instance running at `redis://127.0.0.1/`.
//! Tests are ignored by default - run with `cargo test --features redis --test redis_store -- --ignored`

#![cfg(feature = "redis")]

use std::sync::Arc;
use std::time::Duration;

use tollgate::ratelimit::ManualClock;
use tollgate::{Analytics, Policy, RateLimiter, RedisStore, Store};

const REDIS_URL: &str = "redis://127.0.0.1/";

// Aligned to a 10s boundary
const START: i64 = 1_700_000_000_000;

/// Check if Redis is available before running tests
async fn redis_available() -> bool {
    RedisStore::connect(REDIS_URL).await.is_ok()
}

/// Connect and clear everything left under `prefix` by an earlier run
async fn create_test_store(prefix: &str) -> Arc<RedisStore> {
    let store = RedisStore::connect(REDIS_URL)
        .await
        .expect("Failed to connect to Redis");
    clear(&store, prefix).await;
    Arc::new(store)
}

async fn clear(store: &RedisStore, prefix: &str) {
    let keys = store.keys_with_prefix(prefix).await.unwrap();
    store.del(&keys).await.unwrap();
}

fn limiter(store: Arc<RedisStore>, prefix: &str, policy: Policy, analytics: bool) -> RateLimiter {
    RateLimiter::builder()
        .store(store)
        .policy(policy)
        .prefix(prefix)
        .analytics(analytics)
        .clock(Arc::new(ManualClock::new(START)))
        .build()
        .unwrap()
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_primitives() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    }

    let prefix = "tollgate-test:primitives";
    let store = create_test_store(prefix).await;
    let key = format!("{}:counter", prefix);

    assert_eq!(store.incr(&key).await.unwrap(), 1);
    assert_eq!(store.incr(&key).await.unwrap(), 2);
    assert_eq!(store.get(&key).await.unwrap(), Some("2".to_string()));
    assert_eq!(store.get(&format!("{}:missing", prefix)).await.unwrap(), None);

    let hash = format!("{}:hash", prefix);
    assert_eq!(store.hincr(&hash, "allowed", 2).await.unwrap(), 2);
    assert_eq!(
        store.hmget(&hash, &["allowed", "denied"]).await.unwrap(),
        vec![Some("2".to_string()), None]
    );

    let short = format!("{}:short", prefix);
    store.set(&short, "x").await.unwrap();
    store.expire(&short, Duration::from_millis(50)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.get(&short).await.unwrap(), None);

    clear(&store, prefix).await;
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_prefix_match_is_literal() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let prefix = "tollgate-test:glob";
    let store = create_test_store(prefix).await;

    store.set(&format!("{}:a*b:1", prefix), "1").await.unwrap();
    store.set(&format!("{}:axxb:1", prefix), "1").await.unwrap();

    let keys = store
        .keys_with_prefix(&format!("{}:a*b", prefix))
        .await
        .unwrap();
    assert_eq!(keys, vec![format!("{}:a*b:1", prefix)]);

    clear(&store, prefix).await;
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_fixed_window_limits_then_denies() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let prefix = "tollgate-test:fixed";
    let store = create_test_store(prefix).await;
    let policy = Policy::fixed_window(3, Duration::from_secs(10)).unwrap();
    let limiter = limiter(store.clone(), prefix, policy, false);

    let mut results = Vec::new();
    for _ in 0..4 {
        let decision = limiter.decide("user").await.unwrap();
        results.push((decision.allowed, decision.remaining));
    }
    assert_eq!(results, vec![(true, 2), (true, 1), (true, 0), (false, 0)]);

    let window_key = format!("{}:user:{}", prefix, START);
    assert_eq!(store.get(&window_key).await.unwrap(), Some("4".to_string()));

    clear(&store, prefix).await;
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_token_bucket_state_keys() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let prefix = "tollgate-test:bucket";
    let store = create_test_store(prefix).await;
    let policy = Policy::token_bucket(2, Duration::from_secs(10), None).unwrap();
    let limiter = limiter(store.clone(), prefix, policy, false);

    assert!(limiter.decide("user").await.unwrap().allowed);
    assert!(limiter.decide("user").await.unwrap().allowed);
    assert!(!limiter.decide("user").await.unwrap().allowed);

    let mut keys = store.keys_with_prefix(prefix).await.unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            format!("{}:user:bucket", prefix),
            format!("{}:user:timestamp", prefix),
        ]
    );
    assert_eq!(
        store.get(&format!("{}:user:timestamp", prefix)).await.unwrap(),
        Some(START.to_string())
    );

    clear(&store, prefix).await;
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_analytics_and_reset() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let prefix = "tollgate-test:analytics";
    let store = create_test_store(prefix).await;
    let policy = Policy::fixed_window(1, Duration::from_secs(10)).unwrap();
    let limiter = limiter(store.clone(), prefix, policy, true);

    limiter.decide("user").await.unwrap();
    limiter.decide("user").await.unwrap();

    assert_eq!(
        limiter.analytics_for("user").await.unwrap(),
        Some(Analytics { allowed: 1, denied: 1 })
    );
    assert_eq!(
        store
            .hmget(&format!("{}:analytics:user", prefix), &["allowed", "denied"])
            .await
            .unwrap(),
        vec![Some("1".to_string()), Some("1".to_string())]
    );

    limiter.reset("user").await.unwrap();
    assert!(store
        .keys_with_prefix(&format!("{}:user", prefix))
        .await
        .unwrap()
        .is_empty());
    assert!(limiter.decide("user").await.unwrap().allowed);

    // The analytics hash survives a reset of the identifier
    assert_eq!(
        limiter.analytics_for("user").await.unwrap(),
        Some(Analytics { allowed: 2, denied: 1 })
    );

    clear(&store, prefix).await;
}
