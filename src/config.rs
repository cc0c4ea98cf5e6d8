//! Configuration management for Tollgate.
//!
//! A limiter can be described in YAML:
//!
//! ```yaml
//! prefix: api
//! analytics: true
//! policy:
//!   algorithm: token_bucket
//!   limit: 100
//!   window_secs: 60
//!   refill_rate: 2.5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{Policy, PolicyKind, DEFAULT_PREFIX};

/// Configuration for one rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Namespace for every store key the limiter writes
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Record allowed/denied totals per identifier
    #[serde(default)]
    pub analytics: bool,

    /// The policy to enforce
    pub policy: PolicyConfig,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

/// Serialized form of a [`Policy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Which algorithm to apply
    pub algorithm: PolicyKind,
    /// Requests per window, or bucket capacity
    pub limit: u64,
    /// Window length in seconds; fractions are allowed
    pub window_secs: f64,
    /// Tokens per second (token bucket only)
    #[serde(default)]
    pub refill_rate: Option<f64>,
}

impl PolicyConfig {
    /// Validate and convert into a [`Policy`].
    pub fn to_policy(&self) -> Result<Policy> {
        let window = Duration::try_from_secs_f64(self.window_secs).map_err(|e| {
            TollgateError::Config(format!("invalid window_secs {}: {}", self.window_secs, e))
        })?;
        Policy::new(self.algorithm, self.limit, window, self.refill_rate)
    }
}

impl TryFrom<&PolicyConfig> for Policy {
    type Error = TollgateError;

    fn try_from(config: &PolicyConfig) -> Result<Self> {
        config.to_policy()
    }
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string, validating the policy.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig = serde_yaml::from_str(yaml).map_err(|e| {
            TollgateError::Config(format!("Failed to parse limiter config: {}", e))
        })?;
        config.policy.to_policy()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
prefix: api
analytics: true
policy:
  algorithm: token_bucket
  limit: 100
  window_secs: 60
  refill_rate: 2.5
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.prefix, "api");
        assert!(config.analytics);

        let policy = config.policy.to_policy().unwrap();
        assert_eq!(policy.kind(), PolicyKind::TokenBucket);
        assert_eq!(policy.limit(), 100);
        assert_eq!(policy.window(), Duration::from_secs(60));
        assert_eq!(policy.refill_rate(), 2.5);
    }

    #[test]
    fn test_defaults() {
        let yaml = r#"
policy:
  algorithm: fixed_window
  limit: 10
  window_secs: 1.5
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.prefix, "ratelimit");
        assert!(!config.analytics);

        let policy = Policy::try_from(&config.policy).unwrap();
        assert_eq!(policy.window_ms(), 1_500);
    }

    #[test]
    fn test_invalid_policy_fails_at_load() {
        let yaml = r#"
policy:
  algorithm: sliding_window
  limit: 0
  window_secs: 10
"#;
        let err = LimiterConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TollgateError::Config(_)));
    }

    #[test]
    fn test_negative_window_rejected() {
        let yaml = r#"
policy:
  algorithm: fixed_window
  limit: 5
  window_secs: -1
"#;
        assert!(LimiterConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_huge_window_rejected() {
        for window in ["1e30", "9.3e18", "4000000000"] {
            let yaml = format!(
                "policy:\n  algorithm: sliding_window\n  limit: 5\n  window_secs: {}\n",
                window
            );
            assert!(matches!(
                LimiterConfig::from_yaml(&yaml),
                Err(TollgateError::Config(_))
            ));
        }
    }

    #[test]
    fn test_unknown_algorithm() {
        let yaml = r#"
policy:
  algorithm: leaky_bucket
  limit: 5
  window_secs: 1
"#;
        assert!(matches!(
            LimiterConfig::from_yaml(yaml),
            Err(TollgateError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = LimiterConfig::from_file("/nonexistent/tollgate.yaml").unwrap_err();
        assert!(matches!(err, TollgateError::Io(_)));
    }
}
