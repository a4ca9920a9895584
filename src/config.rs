//! Runtime configuration for the shapes client
//!
//! All values are deployment inputs, supplied by the environment (or
//! directly by the embedding application). Nothing here is computed at
//! runtime.

use std::time::Duration;

use crate::attestation::SessionConfig;
use crate::error::{Error, Result};

/// Default per-request timeout for every outbound call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the shapes API and its protection services.
#[derive(Debug, Clone)]
pub struct Config {
    /// Logical API domain tokens are scoped to, e.g. "shapes.approov.io".
    pub api_domain: String,

    /// Version path segment, e.g. "v3".
    pub api_version: String,

    /// Static API key sent with every request.
    pub api_key: String,

    /// Attestation backend hostname.
    pub attester_host: String,

    /// Site key registered with the attestation backend.
    pub site_key: String,

    /// Fingerprint provider hostname.
    pub fingerprint_host: String,

    /// Public API key for the fingerprint provider.
    pub fingerprint_public_key: String,

    /// Bound on every outbound network call.
    pub request_timeout: Duration,
}

impl Config {
    /// Build a configuration for the public demo deployment, supplying
    /// the three secrets that have no usable default.
    pub fn new(
        api_key: impl Into<String>,
        site_key: impl Into<String>,
        fingerprint_public_key: impl Into<String>,
    ) -> Self {
        Self {
            api_domain: "shapes.approov.io".into(),
            api_version: "v3".into(),
            api_key: api_key.into(),
            attester_host: "web-1.approovr.io".into(),
            site_key: site_key.into(),
            fingerprint_host: "fpjscdn.net".into(),
            fingerprint_public_key: fingerprint_public_key.into(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Load configuration from `SHAPES_*` environment variables.
    ///
    /// Required:
    /// - `SHAPES_API_KEY`
    /// - `SHAPES_SITE_KEY`
    /// - `SHAPES_FINGERPRINT_PUBLIC_KEY`
    ///
    /// Optional, falling back to the public demo deployment:
    /// - `SHAPES_API_DOMAIN`, `SHAPES_API_VERSION`
    /// - `SHAPES_ATTESTER_HOST`, `SHAPES_FINGERPRINT_HOST`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            require_env("SHAPES_API_KEY")?,
            require_env("SHAPES_SITE_KEY")?,
            require_env("SHAPES_FINGERPRINT_PUBLIC_KEY")?,
        );
        config.api_domain = env_or("SHAPES_API_DOMAIN", &config.api_domain);
        config.api_version = env_or("SHAPES_API_VERSION", &config.api_version);
        config.attester_host = env_or("SHAPES_ATTESTER_HOST", &config.attester_host);
        config.fingerprint_host = env_or("SHAPES_FINGERPRINT_HOST", &config.fingerprint_host);
        Ok(config)
    }

    /// Base URL of the shapes API.
    pub fn base_url(&self) -> String {
        format!("https://{}", self.api_domain)
    }

    /// Parameters handed to the attestation backend whenever a session
    /// is (re)initialized.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.attester_host.clone(),
            site_key: self.site_key.clone(),
            fingerprint_public_key: self.fingerprint_public_key.clone(),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("{name} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_demo_deployment() {
        let config = Config::new("api-key", "site-key", "fp-key");
        assert_eq!(config.base_url(), "https://shapes.approov.io");
        assert_eq!(config.api_version, "v3");
        assert_eq!(config.attester_host, "web-1.approovr.io");
    }

    #[test]
    fn test_session_config_carries_fixed_parameters() {
        let config = Config::new("api-key", "site-key", "fp-key");
        let session = config.session_config();
        assert_eq!(session.host, "web-1.approovr.io");
        assert_eq!(session.site_key, "site-key");
        assert_eq!(session.fingerprint_public_key, "fp-key");
    }

    #[test]
    fn test_missing_required_variable_is_a_config_error() {
        let error = require_env("SHAPES_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(matches!(error, Error::Config(message) if message.contains("SHAPES_TEST_UNSET_VARIABLE")));
    }

    #[test]
    fn test_env_or_falls_back_to_default() {
        assert_eq!(env_or("SHAPES_TEST_UNSET_VARIABLE", "fallback"), "fallback");
    }
}
