//! Authentication Configuration Types
//!
//! [`AuthConfig`] is deserialized from the `auth` table of the server
//! configuration. Only `oidc_url` is required; every other key has a default.

use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::http_client::ensure_secure_url;

/// Resource server token validation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    /// Full URL of the OpenID Connect discovery document
    pub oidc_url: String,

    /// Audience the token must carry; audience is not checked when unset
    #[serde(default)]
    pub expected_audience: Option<String>,

    /// Tolerance applied to `exp`, `iat` and `nbf`
    #[serde(default)]
    pub clock_skew_leeway_seconds: u64,

    /// Fixed JWKS lifetime; overrides the IdP's `Cache-Control` when set
    #[serde(default)]
    pub jwks_refresh_interval_seconds: Option<u64>,

    /// JWKS lifetime when the IdP sends no usable `Cache-Control`
    #[serde(default = "default_jwks_ttl")]
    pub jwks_default_ttl_seconds: u64,

    /// Upper bound on a `Cache-Control: max-age` lifetime
    #[serde(default = "default_jwks_max_ttl")]
    pub jwks_max_ttl_seconds: u64,

    /// Minimum spacing between JWKS refresh attempts
    #[serde(default = "default_min_refresh_interval")]
    pub jwks_min_refresh_interval_seconds: u64,

    /// Period of background rediscovery; disabled when unset
    #[serde(default)]
    pub discovery_refresh_interval_seconds: Option<u64>,

    /// Timeout for discovery and JWKS requests
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,

    /// Body size cap for discovery and JWKS responses
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Signature algorithms a token header may declare
    #[serde(default = "default_allowed_algorithms")]
    pub allowed_algorithms: Vec<Algorithm>,
}

/// Longest JWKS lifetime any setting may ask for (one year)
pub const MAX_JWKS_TTL_SECONDS: u64 = 365 * 86_400;

fn default_jwks_ttl() -> u64 {
    600
}

fn default_jwks_max_ttl() -> u64 {
    86_400
}

fn default_min_refresh_interval() -> u64 {
    5
}

fn default_http_timeout() -> u64 {
    10
}

fn default_max_response_bytes() -> usize {
    256 * 1024
}

/// Asymmetric algorithms accepted unless configured otherwise
pub fn default_allowed_algorithms() -> Vec<Algorithm> {
    vec![
        Algorithm::RS256,
        Algorithm::RS384,
        Algorithm::RS512,
        Algorithm::PS256,
        Algorithm::PS384,
        Algorithm::PS512,
        Algorithm::ES256,
        Algorithm::ES384,
        Algorithm::EdDSA,
    ]
}

impl AuthConfig {
    /// Create a configuration with default settings for `oidc_url`
    pub fn new(oidc_url: impl Into<String>) -> Self {
        Self {
            oidc_url: oidc_url.into(),
            expected_audience: None,
            clock_skew_leeway_seconds: 0,
            jwks_refresh_interval_seconds: None,
            jwks_default_ttl_seconds: default_jwks_ttl(),
            jwks_max_ttl_seconds: default_jwks_max_ttl(),
            jwks_min_refresh_interval_seconds: default_min_refresh_interval(),
            discovery_refresh_interval_seconds: None,
            http_timeout_seconds: default_http_timeout(),
            max_response_bytes: default_max_response_bytes(),
            allowed_algorithms: default_allowed_algorithms(),
        }
    }

    /// Require the given audience
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    /// Set the clock skew leeway in seconds
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.clock_skew_leeway_seconds = seconds;
        self
    }

    /// Pin the JWKS lifetime regardless of `Cache-Control`
    pub fn with_jwks_ttl(mut self, seconds: u64) -> Self {
        self.jwks_refresh_interval_seconds = Some(seconds);
        self
    }

    /// Set the minimum spacing between JWKS refreshes
    pub fn with_min_refresh_interval(mut self, seconds: u64) -> Self {
        self.jwks_min_refresh_interval_seconds = seconds;
        self
    }

    /// Enable background rediscovery
    pub fn with_discovery_refresh(mut self, seconds: u64) -> Self {
        self.discovery_refresh_interval_seconds = Some(seconds);
        self
    }

    /// Set the outbound request timeout
    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    /// Replace the algorithm allow-list
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    /// Check the configuration before any network activity
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `oidc_url` is not an HTTPS (or loopback
    /// HTTP) URL, the algorithm list is empty or contains an `HS*` algorithm,
    /// the HTTP timeout or body cap is zero, a JWKS lifetime exceeds
    /// [`MAX_JWKS_TTL_SECONDS`], or `expected_audience` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_secure_url(&self.oidc_url)
            .map_err(|e| ConfigError::new("oidc_url", e.to_string()))?;

        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::new(
                "allowed_algorithms",
                "at least one algorithm is required",
            ));
        }

        if let Some(alg) = self
            .allowed_algorithms
            .iter()
            .find(|alg| is_symmetric(**alg))
        {
            return Err(ConfigError::new(
                "allowed_algorithms",
                format!("symmetric algorithm {:?} cannot verify IdP-issued tokens", alg),
            ));
        }

        if self.http_timeout_seconds == 0 {
            return Err(ConfigError::new("http_timeout_seconds", "must be positive"));
        }

        if self.max_response_bytes == 0 {
            return Err(ConfigError::new("max_response_bytes", "must be positive"));
        }

        for (key, seconds) in [
            ("jwks_refresh_interval_seconds", self.jwks_refresh_interval_seconds),
            ("jwks_default_ttl_seconds", Some(self.jwks_default_ttl_seconds)),
            ("jwks_max_ttl_seconds", Some(self.jwks_max_ttl_seconds)),
        ] {
            if seconds.is_some_and(|seconds| seconds > MAX_JWKS_TTL_SECONDS) {
                return Err(ConfigError::new(
                    key,
                    format!("must not exceed {} seconds", MAX_JWKS_TTL_SECONDS),
                ));
            }
        }

        if self.jwks_default_ttl_seconds > self.jwks_max_ttl_seconds {
            return Err(ConfigError::new(
                "jwks_default_ttl_seconds",
                "must not exceed jwks_max_ttl_seconds",
            ));
        }

        if matches!(self.discovery_refresh_interval_seconds, Some(0)) {
            return Err(ConfigError::new(
                "discovery_refresh_interval_seconds",
                "must be positive when set",
            ));
        }

        if self
            .expected_audience
            .as_deref()
            .is_some_and(|aud| aud.trim().is_empty())
        {
            return Err(ConfigError::new(
                "expected_audience",
                "must not be empty when set",
            ));
        }

        Ok(())
    }

    /// Outbound request timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Background rediscovery period, if enabled
    pub fn discovery_refresh_interval(&self) -> Option<Duration> {
        self.discovery_refresh_interval_seconds
            .map(Duration::from_secs)
    }

    /// Key cache settings derived from this configuration
    pub fn key_cache_settings(&self) -> KeyCacheSettings {
        KeyCacheSettings {
            ttl_override: self.jwks_refresh_interval_seconds.map(Duration::from_secs),
            default_ttl: Duration::from_secs(self.jwks_default_ttl_seconds),
            max_ttl: Duration::from_secs(self.jwks_max_ttl_seconds),
            min_refresh_interval: Duration::from_secs(self.jwks_min_refresh_interval_seconds),
        }
    }
}

/// Freshness and throttling parameters for the key cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCacheSettings {
    /// Fixed lifetime overriding `Cache-Control`
    pub ttl_override: Option<Duration>,
    /// Lifetime when the IdP sends no usable `Cache-Control`
    pub default_ttl: Duration,
    /// Cap on `Cache-Control: max-age`
    pub max_ttl: Duration,
    /// Minimum spacing between refresh attempts
    pub min_refresh_interval: Duration,
}

impl Default for KeyCacheSettings {
    fn default() -> Self {
        Self {
            ttl_override: None,
            default_ttl: Duration::from_secs(default_jwks_ttl()),
            max_ttl: Duration::from_secs(default_jwks_max_ttl()),
            min_refresh_interval: Duration::from_secs(default_min_refresh_interval()),
        }
    }
}

fn is_symmetric(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}
