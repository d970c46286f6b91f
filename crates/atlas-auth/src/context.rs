//! Request authentication context
//!
//! [`BearerToken`] is what the middleware pulls out of the `Authorization`
//! header. [`Principal`] is what it puts into the request extensions once
//! every verification step has passed; handlers read it from there.

use http::HeaderMap;
use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::AuthError;
use crate::jwt::DecodedClaims;

/// Raw compact token from `Authorization: Bearer <token>`
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a compact token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Extract the token from request headers
    ///
    /// The scheme is matched case-insensitively. Exactly one `Authorization`
    /// header is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] if the header is absent,
    /// repeated, not valid ASCII, uses another scheme or carries no token
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        let mut values = headers.get_all(AUTHORIZATION).iter();
        let (Some(value), None) = (values.next(), values.next()) else {
            return Err(AuthError::MissingCredentials);
        };

        let value = value.to_str().map_err(|_| AuthError::MissingCredentials)?;
        Self::from_authorization(value)
    }

    /// Parse an `Authorization` header value
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] unless the value has the
    /// form `Bearer <token>`
    pub fn from_authorization(value: &str) -> Result<Self, AuthError> {
        let (scheme, token) = value
            .trim()
            .split_once(' ')
            .ok_or(AuthError::MissingCredentials)?;

        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::MissingCredentials);
        }

        let token = token.trim();
        if token.is_empty() || token.contains(char::is_whitespace) {
            return Err(AuthError::MissingCredentials);
        }

        Ok(Self(token.to_string()))
    }

    /// The compact token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

/// Authenticated identity attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// `sub`
    pub subject: String,

    /// `iss`
    pub issuer: String,

    /// `aud`, as a list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,

    /// Space-separated `scope`, split
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// OAuth client (`client_id`, else `azp`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// `exp` (seconds since the epoch)
    pub expires_at: i64,
}

impl Principal {
    /// Whether the token carried `scope`
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Expiry as a [`SystemTime`]; `None` if it is not representable
    pub fn expires_at_time(&self) -> Option<SystemTime> {
        let seconds = u64::try_from(self.expires_at).ok()?;
        UNIX_EPOCH.checked_add(Duration::from_secs(seconds))
    }
}

impl From<DecodedClaims> for Principal {
    fn from(claims: DecodedClaims) -> Self {
        let audiences = claims.audiences();
        let scopes = claims.scopes();
        Self {
            subject: claims.sub,
            issuer: claims.iss,
            audiences,
            scopes,
            email: claims.email,
            name: claims.name,
            preferred_username: claims.preferred_username,
            client_id: claims.client_id.or(claims.azp),
            expires_at: claims.exp,
        }
    }
}

#[cfg(feature = "axum")]
mod extract {
    use super::Principal;
    use axum::extract::{FromRequestParts, OptionalFromRequestParts};
    use http::StatusCode;
    use http::request::Parts;
    use std::convert::Infallible;

    impl<S: Send + Sync> FromRequestParts<S> for Principal {
        type Rejection = StatusCode;

        async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
            parts
                .extensions
                .get::<Principal>()
                .cloned()
                .ok_or(StatusCode::UNAUTHORIZED)
        }
    }

    impl<S: Send + Sync> OptionalFromRequestParts<S> for Principal {
        type Rejection = Infallible;

        async fn from_request_parts(
            parts: &mut Parts,
            _state: &S,
        ) -> Result<Option<Self>, Self::Rejection> {
            Ok(parts.extensions.get::<Principal>().cloned())
        }
    }
}
