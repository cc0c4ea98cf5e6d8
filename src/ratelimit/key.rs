//! Store key layout.
//!
//! Keys must stay byte-compatible with other implementations sharing the
//! same store:
//!
//! ```text
//! {prefix}:{identifier}:{windowStartMs}     fixed window
//! {prefix}:{identifier}:{windowIndex}       sliding window
//! {prefix}:{identifier}:bucket              token bucket tokens
//! {prefix}:{identifier}:timestamp           token bucket last refill
//! {prefix}:analytics:{identifier}           analytics hash
//! ```

use std::fmt;

/// The namespaced base key for one identifier under one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    base: String,
}

impl LimitKey {
    /// Build `{prefix}:{identifier}`.
    pub fn new(prefix: &str, identifier: &str) -> Self {
        Self {
            base: format!("{}:{}", prefix, identifier),
        }
    }

    /// The base key itself.
    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Append a `:{suffix}` segment.
    pub fn with_suffix(&self, suffix: impl fmt::Display) -> String {
        format!("{}:{}", self.base, suffix)
    }

    /// The analytics hash key for an identifier.
    pub fn analytics(prefix: &str, identifier: &str) -> String {
        format!("{}:analytics:{}", prefix, identifier)
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let key = LimitKey::new("ratelimit", "user-1");

        assert_eq!(key.as_str(), "ratelimit:user-1");
        assert_eq!(key.with_suffix(1_700_000_000_000i64), "ratelimit:user-1:1700000000000");
        assert_eq!(key.with_suffix("bucket"), "ratelimit:user-1:bucket");
        assert_eq!(LimitKey::analytics("ratelimit", "user-1"), "ratelimit:analytics:user-1");
    }

    #[test]
    fn test_key_equality() {
        assert_eq!(LimitKey::new("a", "b"), LimitKey::new("a", "b"));
        assert_ne!(LimitKey::new("a", "b"), LimitKey::new("a", "c"));
    }
}
