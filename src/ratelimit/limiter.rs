//! The rate limiter facade.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tracing::{debug, instrument, trace};

use super::clock::{Clock, SystemClock};
use super::decision::{Analytics, Decision, IdentifiedDecision};
use super::key::LimitKey;
use super::policy::{Policy, PolicyKind};
use super::{fixed_window, sliding_window, token_bucket};
use crate::config::LimiterConfig;
use crate::error::{Result, TollgateError};
use crate::store::{Store, StoreError};

/// Key prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "ratelimit";
/// How long analytics counters live after their last update.
const ANALYTICS_TTL: Duration = Duration::from_secs(86_400);

const ALLOWED_FIELD: &str = "allowed";
const DENIED_FIELD: &str = "denied";

/// Callback run after a request is denied.
pub type LimitExceededHook =
    Arc<dyn Fn(String, Decision) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Makes rate limit decisions for identifiers under a single policy.
///
/// The limiter holds no per-identifier state of its own. Everything lives in
/// the store under `{prefix}:{identifier}`, so any number of limiters in any
/// number of processes can share one store, and distinct prefixes never
/// interfere. It is safe to share behind an `Arc`.
pub struct RateLimiter {
    store: Arc<dyn Store>,
    policy: Policy,
    prefix: String,
    analytics: bool,
    clock: Arc<dyn Clock>,
    on_limit_exceeded: Option<LimitExceededHook>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("prefix", &self.prefix)
            .field("analytics", &self.analytics)
            .field("on_limit_exceeded", &self.on_limit_exceeded.is_some())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter with the default prefix, no analytics and no callback.
    pub fn new(store: Arc<dyn Store>, policy: Policy) -> Self {
        Self {
            store,
            policy,
            prefix: DEFAULT_PREFIX.to_string(),
            analytics: false,
            clock: Arc::new(SystemClock::new()),
            on_limit_exceeded: None,
        }
    }

    /// Start building a limiter.
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    /// Create a limiter from loaded configuration.
    pub fn from_config(store: Arc<dyn Store>, config: &LimiterConfig) -> Result<Self> {
        Self::builder()
            .store(store)
            .policy(config.policy.to_policy()?)
            .prefix(config.prefix.clone())
            .analytics(config.analytics)
            .build()
    }

    /// The policy applied to every identifier.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether allowed/denied totals are being recorded.
    pub fn analytics_enabled(&self) -> bool {
        self.analytics
    }

    /// Count one request for `identifier` and decide whether it may proceed.
    ///
    /// Store failures are returned unchanged; the request is never silently
    /// allowed or denied. If a limit-exceeded callback is configured it runs
    /// after a denial and its error, if any, is returned as
    /// [`TollgateError::Callback`] even though the decision was recorded.
    #[instrument(skip(self), fields(prefix = %self.prefix, algorithm = %self.policy.kind()))]
    pub async fn decide(&self, identifier: &str) -> Result<Decision> {
        let key = LimitKey::new(&self.prefix, identifier);
        let now_ms = self.clock.now_ms();
        let store = self.store.as_ref();

        let decision = match self.policy.kind() {
            PolicyKind::FixedWindow => {
                fixed_window::evaluate(store, &key, &self.policy, now_ms).await?
            }
            PolicyKind::SlidingWindow => {
                sliding_window::evaluate(store, &key, &self.policy, now_ms).await?
            }
            PolicyKind::TokenBucket => {
                token_bucket::evaluate(store, &key, &self.policy, now_ms).await?
            }
        };

        trace!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            reset_at_ms = decision.reset_at_ms,
            "Rate limit decided"
        );

        if self.analytics {
            self.record_analytics(identifier, decision.allowed).await?;
        }

        if !decision.allowed {
            debug!(
                key = %key,
                limit = decision.limit,
                reset_at_ms = decision.reset_at_ms,
                "Rate limit exceeded"
            );
            if let Some(hook) = &self.on_limit_exceeded {
                hook(identifier.to_string(), decision)
                    .await
                    .map_err(TollgateError::Callback)?;
            }
        }

        Ok(decision)
    }

    /// Decide for several identifiers concurrently.
    ///
    /// Results come back in input order, one per identifier. Each decision is
    /// independent; there is no transaction across them. The first failure
    /// aborts the batch.
    pub async fn decide_many<I, S>(&self, identifiers: I) -> Result<Vec<IdentifiedDecision>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let checks = identifiers.into_iter().map(|identifier| {
            let identifier = identifier.as_ref().to_string();
            async move {
                let decision = self.decide(&identifier).await?;
                Ok::<_, TollgateError>(IdentifiedDecision {
                    identifier,
                    decision,
                })
            }
        });

        try_join_all(checks).await
    }

    /// Delete every stored key that starts with `{prefix}:{identifier}`.
    ///
    /// The match is on the raw key prefix, not on whole identifiers: resetting
    /// `u` also clears `user-2`, and resetting `analytics` clears the analytics
    /// hash of every identifier. Otherwise analytics counters live under a
    /// separate key and are kept.
    ///
    /// Best effort: a decision racing the reset may see partially cleared
    /// state.
    pub async fn reset(&self, identifier: &str) -> Result<()> {
        let key = LimitKey::new(&self.prefix, identifier);
        let keys = self.store.keys_with_prefix(key.as_str()).await?;

        debug!(key = %key, count = keys.len(), "Resetting rate limit state");

        if !keys.is_empty() {
            self.store.del(&keys).await?;
        }
        Ok(())
    }

    /// Remaining quota for `identifier`.
    ///
    /// This is not a peek: it runs a full [`decide`](Self::decide) and so
    /// consumes one unit of quota (and may fire the callback).
    pub async fn remaining_for(&self, identifier: &str) -> Result<u64> {
        Ok(self.decide(identifier).await?.remaining)
    }

    /// Allowed and denied totals for `identifier`.
    ///
    /// Returns `None` when analytics is disabled.
    pub async fn analytics_for(&self, identifier: &str) -> Result<Option<Analytics>> {
        if !self.analytics {
            return Ok(None);
        }

        let analytics_key = LimitKey::analytics(&self.prefix, identifier);
        let values = self
            .store
            .hmget(&analytics_key, &[ALLOWED_FIELD, DENIED_FIELD])
            .await?;

        let parse = |value: Option<&Option<String>>| -> Result<u64> {
            match value {
                Some(Some(raw)) => raw.parse().map_err(|_| {
                    TollgateError::Store(StoreError::NotAnInteger {
                        key: analytics_key.clone(),
                    })
                }),
                _ => Ok(0),
            }
        };

        Ok(Some(Analytics {
            allowed: parse(values.first())?,
            denied: parse(values.get(1))?,
        }))
    }

    async fn record_analytics(&self, identifier: &str, allowed: bool) -> Result<()> {
        let analytics_key = LimitKey::analytics(&self.prefix, identifier);
        let field = if allowed { ALLOWED_FIELD } else { DENIED_FIELD };

        self.store.hincr(&analytics_key, field, 1).await?;
        self.store.expire(&analytics_key, ANALYTICS_TTL).await?;

        trace!(key = %analytics_key, field, "Analytics recorded");
        Ok(())
    }
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterBuilder {
    store: Option<Arc<dyn Store>>,
    policy: Option<Policy>,
    prefix: String,
    analytics: bool,
    clock: Arc<dyn Clock>,
    on_limit_exceeded: Option<LimitExceededHook>,
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self {
            store: None,
            policy: None,
            prefix: DEFAULT_PREFIX.to_string(),
            analytics: false,
            clock: Arc::new(SystemClock::new()),
            on_limit_exceeded: None,
        }
    }
}

impl RateLimiterBuilder {
    /// The store holding all counters. Required.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// The policy to enforce. Required.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Namespace for every key this limiter writes.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Record allowed/denied totals per identifier.
    pub fn analytics(mut self, enabled: bool) -> Self {
        self.analytics = enabled;
        self
    }

    /// Override the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run `hook` with the identifier and decision after every denial.
    pub fn on_limit_exceeded<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(String, Decision) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_limit_exceeded = Some(Arc::new(move |identifier, decision| {
            hook(identifier, decision).boxed()
        }));
        self
    }

    /// Validate and build the limiter.
    pub fn build(self) -> Result<RateLimiter> {
        let store = self
            .store
            .ok_or_else(|| TollgateError::Config("a store is required".to_string()))?;
        let policy = self
            .policy
            .ok_or_else(|| TollgateError::Config("a policy is required".to_string()))?;
        if self.prefix.is_empty() {
            return Err(TollgateError::Config("prefix must not be empty".to_string()));
        }

        Ok(RateLimiter {
            store,
            policy,
            prefix: self.prefix,
            analytics: self.analytics,
            clock: self.clock,
            on_limit_exceeded: self.on_limit_exceeded,
        })
    }
}
