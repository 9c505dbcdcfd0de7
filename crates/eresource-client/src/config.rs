//! Client configuration
//!
//! A [`ClientConfig`] describes how to reach the remote API. It can be built
//! in code, loaded from YAML, or read from the environment.
//!
//! ```yaml
//! base_url: https://api.example.com
//! timeout_secs: 10
//! api_key: secret-key
//! default_headers:
//!   Accept: application/json
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Environment variable holding the base URL
pub const ENV_BASE_URL: &str = "ERESOURCE_BASE_URL";
/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "ERESOURCE_API_KEY";
/// Environment variable holding the timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "ERESOURCE_TIMEOUT_SECS";

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the remote API
///
/// # Examples
///
/// ```rust
/// use eresource_client::ClientConfig;
///
/// let config = ClientConfig::new("https://api.example.com")
///     .with_api_key("secret-key")
///     .with_header("Accept", "application/json");
/// assert_eq!(config.timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Prefix joined onto every request path
    pub base_url: String,

    /// Request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sent as a Bearer token when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Headers added to every request
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}

impl ClientConfig {
    /// Configuration for `base_url` with default settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
            default_headers: HashMap::new(),
        }
    }

    /// Set API key for authentication
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Read `ERESOURCE_BASE_URL`, `ERESOURCE_API_KEY` and
    /// `ERESOURCE_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_BASE_URL).ok_or_else(|| {
            ClientError::ConfigError(format!("{} is not set", ENV_BASE_URL))
        })?;
        let mut config = Self::new(base_url);
        config.api_key = lookup(ENV_API_KEY).filter(|key| !key.is_empty());
        if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout_secs = timeout.parse().map_err(|_| {
                ClientError::ConfigError(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_TIMEOUT_SECS, timeout
                ))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::ConfigError("base_url must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::ConfigError(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_yaml_defaults() {
        let config = ClientConfig::from_yaml_str("base_url: http://localhost:8080\n").unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.api_key.is_none());
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn test_yaml_rejects_empty_base_url() {
        assert!(matches!(
            ClientConfig::from_yaml_str("base_url: ''\n"),
            Err(ClientError::ConfigError(_))
        ));
    }

    #[test]
    fn test_env_lookup() {
        let config = ClientConfig::from_lookup(env(&[
            (ENV_BASE_URL, "https://api.example.com"),
            (ENV_API_KEY, "secret"),
            (ENV_TIMEOUT_SECS, "5"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_requires_base_url() {
        assert!(ClientConfig::from_lookup(env(&[])).is_err());
    }

    #[test]
    fn test_env_rejects_bad_timeout() {
        let result = ClientConfig::from_lookup(env(&[
            (ENV_BASE_URL, "https://api.example.com"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]));
        assert!(matches!(result, Err(ClientError::ConfigError(_))));
    }
}
