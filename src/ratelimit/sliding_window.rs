//! Sliding window approximation.
//!
//! Two fixed windows stand in for a continuous one: the previous window's
//! count is weighted by how much of it still overlaps the trailing window and
//! added to the current count. This smooths the burst a fixed window allows
//! at its boundary, at the cost of being an estimate.

use tracing::{trace, warn};

use super::decision::Decision;
use super::key::LimitKey;
use super::policy::Policy;
use crate::store::{Store, StoreError};

/// Count one request and weigh it against the trailing window.
pub async fn evaluate(
    store: &dyn Store,
    key: &LimitKey,
    policy: &Policy,
    now_ms: i64,
) -> Result<Decision, StoreError> {
    let limit = policy.limit();
    let window_ms = policy.window_ms();
    let current_window = now_ms.div_euclid(window_ms);
    let previous_window = current_window - 1;

    let current_key = key.with_suffix(current_window);
    let previous_key = key.with_suffix(previous_window);

    // The previous bucket is settled, so a plain read is enough
    let (current_count, previous_raw) =
        tokio::try_join!(store.incr(&current_key), store.get(&previous_key))?;

    if current_count == 1 {
        // Keep each bucket readable for the whole window after its own
        store.expire(&current_key, policy.window().saturating_mul(2)).await?;
    }

    let previous_count = match previous_raw {
        Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
            warn!(key = %previous_key, value = %raw, "Ignoring unparseable window count");
            0
        }),
        None => 0,
    };

    let fraction_elapsed = now_ms.rem_euclid(window_ms) as f64 / window_ms as f64;
    let weighted =
        previous_count as f64 * (1.0 - fraction_elapsed) + current_count as f64;

    trace!(
        key = %current_key,
        current = current_count,
        previous = previous_count,
        weighted,
        limit,
        "Sliding window counted"
    );

    let remaining = (limit as f64 - weighted).floor().max(0.0) as u64;
    Ok(Decision {
        allowed: weighted <= limit as f64,
        limit,
        remaining: remaining.min(limit),
        reset_at_ms: (current_window + 1) * window_ms,
    })
}
