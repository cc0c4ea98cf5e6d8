//! Notify someone when an identifier runs out of quota.
//!
//! Run with `cargo run --example callback`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tracing::{info, warn, Level};

use tollgate::{Decision, MemoryStore, Policy, RateLimiter};

async fn send_email(identifier: &str, decision: &Decision) -> anyhow::Result<()> {
    let reset = Utc
        .timestamp_millis_opt(decision.reset_at_ms)
        .single()
        .ok_or_else(|| anyhow::anyhow!("reset time out of range"))?;
    info!(%identifier, reset = %reset.format("%H:%M:%S"), "Sending rate limit email");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let limiter = RateLimiter::builder()
        .store(Arc::new(MemoryStore::new()))
        .policy(Policy::fixed_window(3, Duration::from_secs(10))?)
        .prefix("example:callback")
        .analytics(true)
        .on_limit_exceeded(|identifier, decision| async move {
            warn!(%identifier, "Rate limit exceeded");
            send_email(&identifier, &decision).await
        })
        .build()?;

    for i in 1..=5 {
        let decision = limiter.decide("user-123").await?;
        info!(
            request = i,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Request processed"
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    if let Some(stats) = limiter.analytics_for("user-123").await? {
        info!(allowed = stats.allowed, denied = stats.denied, "Analytics");
    }

    Ok(())
}
