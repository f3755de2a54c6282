//! Configuration for the resource client.
//!
//! This module defines the [`ClientConfig`] struct that controls where the
//! client talks to, how long responses stay cached, and how hard the no-fork
//! retry loop tries.
//!
//! # Configuration Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `rest_url` | `http://localhost:6541` | Prefix for absolute paths |
//! | `request_timeout_ms` | 30000 | Per-request timeout |
//! | `cache_capacity` | 10000 | Max cached paths |
//! | `cache_max_age_ms` | 300000 | Cache time-to-live |
//! | `no_fork_max_attempts` | 5 | Total version post attempts |
//! | `no_fork_backoff_ms` | 250 | First retry wait |
//! | `no_fork_jitter` | 0.25 | Relative jitter of each wait |
//! | `max_ancestor_depth` | 32 | Bound for parent walks |
//! | `non_resource_paths` | `meta_api`, `batch`, ... | Cached without push subscription |
//!
//! # Examples
//!
//! ```
//! use agora_http::ClientConfig;
//!
//! let config = ClientConfig {
//!     rest_url: "https://example.org/api".to_string(),
//!     ..Default::default()
//! };
//! assert_eq!(config.cache_capacity, 10_000);
//! ```
//!
//! ## From JSON
//!
//! ```
//! use agora_http::ClientConfig;
//!
//! let config = ClientConfig::from_json_str(r#"{"rest_url": "http://x"}"#).unwrap();
//! assert_eq!(config.rest_url, "http://x");
//! assert_eq!(config.no_fork_max_attempts, 5);
//! ```

use crate::core::error::{AgoraError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_NON_RESOURCE_PATHS: &[&str] = &[
    "login_username",
    "login_email",
    "activate_account",
    "meta_api",
    "message_user",
    "create_password_reset",
    "password_reset",
    "report_abuse",
    "batch",
];

/// Configuration for the resource client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend root. Paths starting with `/` are resolved against it.
    pub rest_url: String,

    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Maximum number of cached paths.
    pub cache_capacity: u64,

    /// Time-to-live of a cache entry in milliseconds, even without
    /// invalidation.
    pub cache_max_age_ms: u64,

    /// Total number of post attempts for a no-fork version, first included.
    pub no_fork_max_attempts: u32,

    /// Wait before the first no-fork retry. Doubles per retry.
    pub no_fork_backoff_ms: u64,

    /// Relative jitter on each no-fork wait.
    pub no_fork_jitter: f64,

    /// Maximum number of parents walked by `resolve_ancestor`.
    pub max_ancestor_depth: usize,

    /// Top-level endpoints that are not resources and get no push
    /// subscription when cached.
    pub non_resource_paths: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            rest_url: "http://localhost:6541".to_string(),
            request_timeout_ms: 30_000,
            cache_capacity: 10_000,
            cache_max_age_ms: 5 * 60 * 1000,
            no_fork_max_attempts: 5,
            no_fork_backoff_ms: 250,
            no_fork_jitter: 0.25,
            max_ancestor_depth: 32,
            non_resource_paths: DEFAULT_NON_RESOURCE_PATHS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.no_fork_max_attempts == 0 {
            return Err(AgoraError::Config(
                "no_fork_max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.no_fork_jitter) {
            return Err(AgoraError::Config(format!(
                "no_fork_jitter must be in [0, 1), got {}",
                self.no_fork_jitter
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[inline]
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_millis(self.cache_max_age_ms)
    }

    /// Full cache keys of the non-resource endpoints.
    pub fn non_resource_urls(&self) -> Vec<String> {
        let base = self.rest_url.trim_end_matches('/');
        self.non_resource_paths
            .iter()
            .map(|p| format!("{}/{}/", base, p.trim_matches('/')))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout_ms, 30_000);
        assert_eq!(config.cache_capacity, 10_000);
        assert_eq!(config.cache_max_age(), Duration::from_secs(300));
        assert_eq!(config.no_fork_max_attempts, 5);
        assert_eq!(config.no_fork_backoff_ms, 250);
        assert_eq!(config.max_ancestor_depth, 32);
    }

    #[test]
    fn test_partial_override() {
        let config = ClientConfig {
            cache_capacity: 10,
            ..Default::default()
        };
        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.no_fork_max_attempts, 5);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ClientConfig::from_json_str(r#"{"rest_url": "http://h/api", "max_ancestor_depth": 4}"#)
                .unwrap();
        assert_eq!(config.rest_url, "http://h/api");
        assert_eq!(config.max_ancestor_depth, 4);
        assert_eq!(config.cache_capacity, 10_000);
    }

    #[test]
    fn test_from_json_rejects_zero_attempts() {
        let err = ClientConfig::from_json_str(r#"{"no_fork_max_attempts": 0}"#).unwrap_err();
        assert!(matches!(err, AgoraError::Config(_)));
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            ClientConfig::from_json_str("{"),
            Err(AgoraError::Json(_))
        ));
    }

    #[test]
    fn test_non_resource_urls() {
        let config = ClientConfig {
            rest_url: "http://h/api/".into(),
            non_resource_paths: vec!["meta_api".into(), "/batch/".into()],
            ..Default::default()
        };
        assert_eq!(
            config.non_resource_urls(),
            vec!["http://h/api/meta_api/", "http://h/api/batch/"]
        );
    }

    #[test]
    fn test_clone() {
        let config = ClientConfig::default();
        assert_eq!(config, config.clone());
    }
}
