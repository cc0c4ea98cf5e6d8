//! Results returned by the limiter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The policy's limit
    pub limit: u64,
    /// Requests left before the limit is reached; zero when denied
    pub remaining: u64,
    /// When the window resets (or a token becomes available), epoch ms
    pub reset_at_ms: i64,
}

impl Decision {
    /// Time from `now_ms` until the reset, zero if already past.
    pub fn retry_after(&self, now_ms: i64) -> Duration {
        let millis = self.reset_at_ms.saturating_sub(now_ms).max(0);
        Duration::from_millis(millis as u64)
    }
}

/// A decision tagged with the identifier it was made for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedDecision {
    pub identifier: String,
    #[serde(flatten)]
    pub decision: Decision,
}

/// Allowed and denied totals recorded for one identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    pub allowed: u64,
    pub denied: u64,
}
