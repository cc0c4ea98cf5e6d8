//! Token bucket.
//!
//! Each identifier owns a bucket of up to `limit` tokens that refills
//! continuously at the policy's refill rate. A request takes one token.
//!
//! The bucket is read, refilled and written back with plain GET/SET, not a
//! compare-and-swap. Two concurrent requests for the same identifier can both
//! start from the same stored state, so under contention the bucket may admit
//! slightly more than it should. Strict accounting would need the whole
//! read-modify-write to run inside the store (a script or transaction).

use tracing::{trace, warn};

use super::decision::Decision;
use super::key::LimitKey;
use super::policy::Policy;
use crate::store::{Store, StoreError};

const BUCKET_SUFFIX: &str = "bucket";
const TIMESTAMP_SUFFIX: &str = "timestamp";

fn parse_or_warn<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = %key, value = %raw, "Ignoring unparseable bucket state");
            None
        }
    }
}

/// Refill the bucket, then try to take one token.
pub async fn evaluate(
    store: &dyn Store,
    key: &LimitKey,
    policy: &Policy,
    now_ms: i64,
) -> Result<Decision, StoreError> {
    let limit = policy.limit();
    let capacity = limit as f64;
    let refill_rate = policy.refill_rate();

    let bucket_key = key.with_suffix(BUCKET_SUFFIX);
    let timestamp_key = key.with_suffix(TIMESTAMP_SUFFIX);

    let (tokens_raw, last_refill_raw) =
        tokio::try_join!(store.get(&bucket_key), store.get(&timestamp_key))?;

    let stored_tokens: f64 = parse_or_warn::<f64>(&bucket_key, tokens_raw)
        .filter(|t| t.is_finite())
        .unwrap_or(capacity);
    let last_refill: i64 = parse_or_warn(&timestamp_key, last_refill_raw).unwrap_or(now_ms);

    // A clock behind the stored timestamp refills nothing
    let elapsed_secs = (now_ms - last_refill).max(0) as f64 / 1000.0;
    let mut tokens = (stored_tokens + elapsed_secs * refill_rate).min(capacity);

    let allowed = tokens >= 1.0;
    if allowed {
        tokens -= 1.0;
    }

    let ttl = policy.window().saturating_mul(2);
    let tokens_value = tokens.to_string();
    let timestamp_value = now_ms.to_string();
    tokio::try_join!(
        store.set(&bucket_key, &tokens_value),
        store.set(&timestamp_key, &timestamp_value),
    )?;
    tokio::try_join!(store.expire(&bucket_key, ttl), store.expire(&timestamp_key, ttl))?;

    trace!(key = %bucket_key, tokens, refill_rate, allowed, "Token bucket evaluated");

    let remaining = (tokens.floor().max(0.0) as u64).min(limit);
    let until_next_token_ms = (((1.0 - tokens) / refill_rate) * 1000.0).ceil().max(0.0) as i64;

    Ok(Decision {
        allowed,
        limit,
        remaining,
        reset_at_ms: now_ms.saturating_add(until_next_token_ms),
    })
}
