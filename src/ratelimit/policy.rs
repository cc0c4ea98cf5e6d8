//! Rate limit policies.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TollgateError};

/// The algorithm a policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Count requests per aligned window
    FixedWindow,
    /// Weighted blend of the current and previous window
    SlidingWindow,
    /// Continuously refilling bucket of tokens
    TokenBucket,
}

impl PolicyKind {
    /// Name used in logs and configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::FixedWindow => "fixed_window",
            PolicyKind::SlidingWindow => "sliding_window",
            PolicyKind::TokenBucket => "token_bucket",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest window a policy accepts, roughly a century.
pub const MAX_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Slowest refill rate a token bucket accepts, in tokens per second.
pub const MIN_REFILL_RATE: f64 = 1e-12;

/// An immutable description of how requests are limited.
///
/// Policies are validated on construction, so a limiter holding one can never
/// fail a decision because of bad parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    kind: PolicyKind,
    limit: u64,
    window: Duration,
    refill_rate: Option<f64>,
}

impl Policy {
    /// Create a policy, validating its parameters.
    ///
    /// `refill_rate` (tokens per second) is only accepted for
    /// [`PolicyKind::TokenBucket`].
    pub fn new(
        kind: PolicyKind,
        limit: u64,
        window: Duration,
        refill_rate: Option<f64>,
    ) -> Result<Self> {
        if limit == 0 {
            return Err(TollgateError::Config(
                "limit must be greater than zero".to_string(),
            ));
        }
        if window.as_millis() == 0 {
            return Err(TollgateError::Config(
                "window must be at least one millisecond".to_string(),
            ));
        }
        if window > MAX_WINDOW {
            return Err(TollgateError::Config(format!(
                "window must be at most {} seconds, got {}",
                MAX_WINDOW.as_secs(),
                window.as_secs()
            )));
        }
        if let Some(rate) = refill_rate {
            if kind != PolicyKind::TokenBucket {
                return Err(TollgateError::Config(format!(
                    "refill_rate is only valid for token_bucket, not {}",
                    kind
                )));
            }
            if !rate.is_finite() || rate < MIN_REFILL_RATE {
                return Err(TollgateError::Config(format!(
                    "refill_rate must be a finite number of at least {}, got {}",
                    MIN_REFILL_RATE, rate
                )));
            }
        }

        Ok(Self {
            kind,
            limit,
            window,
            refill_rate,
        })
    }

    /// Allow `limit` requests per aligned window.
    pub fn fixed_window(limit: u64, window: Duration) -> Result<Self> {
        Self::new(PolicyKind::FixedWindow, limit, window, None)
    }

    /// Allow roughly `limit` requests in any trailing window.
    pub fn sliding_window(limit: u64, window: Duration) -> Result<Self> {
        Self::new(PolicyKind::SlidingWindow, limit, window, None)
    }

    /// Allow bursts of up to `limit` requests, refilling at `refill_rate`
    /// tokens per second (or `limit / window` when not given).
    pub fn token_bucket(limit: u64, window: Duration, refill_rate: Option<f64>) -> Result<Self> {
        Self::new(PolicyKind::TokenBucket, limit, window, refill_rate)
    }

    /// The algorithm this policy applies.
    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Maximum requests per window, or bucket capacity.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// The window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The window length in milliseconds, always at least 1.
    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }

    /// Tokens restored per second.
    ///
    /// Defaults to `limit / window`, which refills an empty bucket over
    /// exactly one window.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
            .unwrap_or_else(|| self.limit as f64 / self.window.as_secs_f64())
    }
}
