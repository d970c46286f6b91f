//! Error types for atlas-auth
//!
//! Three tiers, innermost first:
//! - [`FetchError`]: a bounded HTTP GET against the identity provider failed
//! - [`DiscoveryError`] / [`KeySetError`]: a discovery document or key set
//!   could not be obtained or understood
//! - [`AuthError`]: the request-facing taxonomy, one variant per failure kind
//!
//! Every credential failure maps to `401 Unauthorized`. The variants stay
//! distinct for logs and metrics only; [`AuthError::reason_code`] is what gets
//! logged, and nothing from this module is ever echoed to the client.

use http::StatusCode;
use thiserror::Error;

/// Result type for authentication operations
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Failure of a single outbound fetch (discovery document or JWKS)
///
/// `Clone` so that one refresh outcome can be shared by every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// URL could not be parsed
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// URL is not HTTPS (plain HTTP is only accepted for loopback hosts)
    #[error("Refusing to fetch over insecure scheme: {0}")]
    InsecureUrl(String),

    /// Request exceeded the configured timeout
    #[error("Request to {0} timed out")]
    Timeout(String),

    /// Connection or protocol failure
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-2xx response
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Body larger than the configured cap
    #[error("Response from {url} exceeds {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },
}

/// OpenID Connect discovery failed
///
/// Fatal at startup: the process must not begin serving traffic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Network failure, timeout, or non-2xx status
    #[error("Discovery fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Body is not a JSON object
    #[error("Discovery document is not valid JSON: {0}")]
    InvalidJson(String),

    /// A required field (`issuer`, `jwks_uri`) is absent or empty
    #[error("Discovery document missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but unusable
    #[error("Invalid discovery field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Fetching or parsing the JSON Web Key Set failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeySetError {
    /// Network failure, timeout, or non-2xx status
    #[error("JWKS fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Body is not a JWKS document
    #[error("Invalid JWKS document: {0}")]
    InvalidJson(String),

    /// The document parsed but contained no usable signing keys
    #[error("JWKS contains no usable signing keys")]
    Empty,
}

/// Configuration rejected by [`crate::AuthConfig::validate`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid auth configuration for `{key}`: {message}")]
pub struct ConfigError {
    /// Offending configuration key
    pub key: &'static str,
    /// What is wrong with it
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

/// Request-facing authentication failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// Invalid configuration, detected before any network activity
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Discovery failed (fatal at startup)
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// No key set has ever been loaded, or the authenticator was shut down
    #[error("Signing key set unavailable: {0}")]
    KeySetUnavailable(String),

    /// No `Authorization: Bearer <token>` header
    #[error("Missing bearer credentials")]
    MissingCredentials,

    /// Token is not three base64url segments with JSON header and claims
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Header algorithm is `none`, symmetric, unknown, or not allow-listed
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// `kid` absent from the key set even after a refresh
    #[error("Unknown signing key id: {kid}")]
    UnknownKey { kid: String },

    /// Signature does not verify under the resolved key
    #[error("Invalid token signature: {0}")]
    InvalidSignature(String),

    /// `iss` differs from the discovered issuer
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    /// `exp` has passed
    #[error("Token expired at {exp}")]
    TokenExpired { exp: i64 },

    /// `iat` or `nbf` lies in the future
    #[error("Token not yet valid: {0}")]
    TokenNotYetValid(String),

    /// Configured audience not present in `aud`
    #[error("Audience mismatch: expected {expected}")]
    AudienceMismatch { expected: String },
}

impl AuthError {
    /// Stable snake_case identifier for logs and metrics
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "invalid_config",
            Self::Discovery(_) => "discovery_failed",
            Self::KeySetUnavailable(_) => "key_set_unavailable",
            Self::MissingCredentials => "missing_credentials",
            Self::MalformedToken(_) => "malformed_token",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::UnknownKey { .. } => "unknown_key",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::IssuerMismatch { .. } => "issuer_mismatch",
            Self::TokenExpired { .. } => "token_expired",
            Self::TokenNotYetValid(_) => "token_not_yet_valid",
            Self::AudienceMismatch { .. } => "audience_mismatch",
        }
    }

    /// HTTP status the middleware answers with
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Discovery(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::KeySetUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Whether the failure is about the presented credential rather than
    /// the validator's own state
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        self.status_code() == StatusCode::UNAUTHORIZED
    }
}
