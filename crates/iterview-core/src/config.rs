//! Client configuration.
//!
//! Defaults come from the environment so binaries and tests can point the
//! client at a server without code changes:
//!
//! - `ITERVIEW_SERVER`: base URL (default `http://127.0.0.1:5000`)
//! - `ITERVIEW_ENDPOINT`: submission path (default `/`)
//! - `ITERVIEW_IDLE_TIMEOUT_SECS`: max wait for the next chunk, `0` disables
//! - `ITERVIEW_MAX_FRAGMENT_BYTES`: largest message the extractor will buffer

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_ENDPOINT: &str = "/";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_FRAGMENT_BYTES: usize = 8 * 1024 * 1024;

/// Settings for submitting a job and consuming its stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URL
    pub server_url: String,
    /// Path the multipart form is posted to
    pub endpoint: String,
    /// Seconds to wait for each chunk before giving up (0 = wait forever)
    pub idle_timeout_secs: u64,
    /// Upper bound on a single buffered message
    pub max_fragment_bytes: usize,
    /// User-Agent header sent with the submission
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: std::env::var("ITERVIEW_SERVER")
                .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
            endpoint: std::env::var("ITERVIEW_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            idle_timeout_secs: env_parse("ITERVIEW_IDLE_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            max_fragment_bytes: env_parse("ITERVIEW_MAX_FRAGMENT_BYTES")
                .unwrap_or(DEFAULT_MAX_FRAGMENT_BYTES),
            user_agent: format!("iterview/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific server, other settings from the environment
    pub fn new(server_url: &str) -> Self {
        ClientConfig {
            server_url: server_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    pub fn with_max_fragment_bytes(mut self, bytes: usize) -> Self {
        self.max_fragment_bytes = bytes;
        self
    }

    /// Idle timeout per chunk read, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Full submission URL.
    pub fn submit_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let path = self.endpoint.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert!(!config.server_url.is_empty());
        assert!(config.user_agent.starts_with("iterview/"));
        assert!(config.max_fragment_bytes > 0);
    }

    #[test]
    fn test_config_new_and_overrides() {
        let config = ClientConfig::new("http://localhost:8080/")
            .with_endpoint("/jobs")
            .with_idle_timeout_secs(0)
            .with_max_fragment_bytes(1024);

        assert_eq!(config.submit_url(), "http://localhost:8080/jobs");
        assert_eq!(config.idle_timeout(), None);
        assert_eq!(config.max_fragment_bytes, 1024);
    }

    #[test]
    fn test_root_endpoint_url() {
        let config = ClientConfig::new("http://localhost:5000").with_endpoint("/");
        assert_eq!(config.submit_url(), "http://localhost:5000/");
    }

    #[test]
    fn test_idle_timeout_duration() {
        let config = ClientConfig::new("http://localhost").with_idle_timeout_secs(45);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(45)));
    }
}
