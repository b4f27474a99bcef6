//! # Operator Configuration
//!
//! Operator-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_MINUTES, DEFAULT_BACKOFF_MIN_MINUTES, DEFAULT_ERROR_REQUEUE_SECS,
    DEFAULT_METRICS_PORT, DEFAULT_PASSWORD_HASH_COST, DEFAULT_SLACK_API_URL,
    DEFAULT_RESYNC_SECS, DEFAULT_SOURCE_REPOSITORY_URL, DEFAULT_TERMINAL_REQUEUE_SECS,
};
use std::time::Duration;

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// bcrypt work factor for managed user passwords
    pub password_hash_cost: u32,
    /// Slack bot token; notifications are disabled when unset
    pub slack_api_token: Option<String>,
    /// Slack `chat.postMessage` endpoint
    pub slack_api_url: String,
    /// Deployment status endpoint; status reports are disabled when unset
    pub deploy_status_url: Option<String>,
    /// Repository linked from the revision field of success notifications
    pub source_repository_url: String,
    /// Interval between passes over a healthy target (seconds)
    pub resync_secs: u64,
    /// Fallback requeue interval for requeueable errors (seconds)
    pub error_requeue_secs: u64,
    /// Requeue interval for terminal errors (seconds)
    pub terminal_requeue_secs: u64,
    /// Fibonacci backoff lower bound (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff upper bound (minutes)
    pub backoff_max_minutes: u64,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            password_hash_cost: DEFAULT_PASSWORD_HASH_COST,
            slack_api_token: None,
            slack_api_url: DEFAULT_SLACK_API_URL.to_string(),
            deploy_status_url: None,
            source_repository_url: DEFAULT_SOURCE_REPOSITORY_URL.to_string(),
            resync_secs: DEFAULT_RESYNC_SECS,
            error_requeue_secs: DEFAULT_ERROR_REQUEUE_SECS,
            terminal_requeue_secs: DEFAULT_TERMINAL_REQUEUE_SECS,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            log_format: "json".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Split out from [`OperatorConfig::from_env`] so tests don't have to mutate the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            password_hash_cost: parse_or(
                &lookup,
                "PASSWORD_HASH_COST",
                defaults.password_hash_cost,
            ),
            slack_api_token: non_empty(&lookup, "SLACK_API_TOKEN"),
            slack_api_url: non_empty(&lookup, "SLACK_API_URL").unwrap_or(defaults.slack_api_url),
            deploy_status_url: non_empty(&lookup, "DEPLOY_STATUS_URL"),
            source_repository_url: non_empty(&lookup, "SOURCE_REPOSITORY_URL")
                .unwrap_or(defaults.source_repository_url),
            resync_secs: parse_or(&lookup, "RESYNC_SECS", defaults.resync_secs),
            error_requeue_secs: parse_or(&lookup, "ERROR_REQUEUE_SECS", defaults.error_requeue_secs),
            terminal_requeue_secs: parse_or(
                &lookup,
                "TERMINAL_REQUEUE_SECS",
                defaults.terminal_requeue_secs,
            ),
            backoff_min_minutes: parse_or(
                &lookup,
                "BACKOFF_MIN_MINUTES",
                defaults.backoff_min_minutes,
            ),
            backoff_max_minutes: parse_or(
                &lookup,
                "BACKOFF_MAX_MINUTES",
                defaults.backoff_max_minutes,
            ),
            log_format: non_empty(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
        }
    }

    /// Get the interval between passes over a healthy target
    pub fn resync_duration(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    /// Get fallback requeue duration for requeueable errors
    pub fn error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    /// Get requeue duration for terminal errors
    pub fn terminal_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.terminal_requeue_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = OperatorConfig::from_lookup(|_| None);
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(config.password_hash_cost, 12);
        assert!(config.slack_api_token.is_none());
        assert!(config.deploy_status_url.is_none());
        assert_eq!(config.terminal_requeue_duration(), Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = OperatorConfig::from_lookup(lookup_from(&[
            ("METRICS_PORT", "9090"),
            ("PASSWORD_HASH_COST", "10"),
            ("SLACK_API_TOKEN", "xoxb-token"),
            ("DEPLOY_STATUS_URL", "http://deploy-status/api"),
            ("LOG_FORMAT", "text"),
        ]));
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.password_hash_cost, 10);
        assert_eq!(config.slack_api_token.as_deref(), Some("xoxb-token"));
        assert_eq!(
            config.deploy_status_url.as_deref(),
            Some("http://deploy-status/api")
        );
        assert_eq!(config.log_format, "text");
    }

    #[test]
    fn test_unparsable_and_blank_values_fall_back() {
        let config = OperatorConfig::from_lookup(lookup_from(&[
            ("METRICS_PORT", "not-a-port"),
            ("SLACK_API_TOKEN", "   "),
        ]));
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert!(config.slack_api_token.is_none());
    }
}
