//! # Tower Middleware Integration for Atlas Auth
//!
//! [`AuthLayer`] wraps any `Service<http::Request<B>>` so that every request
//! must carry a valid bearer token before it reaches the inner service.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use atlas_auth::tower::{AuthLayer, AuthLayerConfig};
//!
//! let service = ServiceBuilder::new()
//!     .layer(AuthLayer::with_config(
//!         authenticator,
//!         AuthLayerConfig::default().public_path("/health"),
//!     ))
//!     .service(my_inner_service);
//! ```
//!
//! ## Request Extensions
//!
//! On success the [`Principal`](crate::Principal) is inserted into the
//! request's extensions:
//!
//! ```rust,ignore
//! if let Some(principal) = req.extensions().get::<Principal>() {
//!     println!("Authenticated subject: {}", principal.subject);
//! }
//! ```
//!
//! ## Rejections
//!
//! Rejected requests never reach the inner service. They are answered with
//! `401 Unauthorized`, `WWW-Authenticate: Bearer` and a generic JSON body, or
//! `503 Service Unavailable` when no key set is available. The specific
//! failure is logged, never returned.

use std::collections::BTreeSet;

mod layer;
mod service;

pub use layer::AuthLayer;
pub use service::{AuthService, AuthServiceFuture};

/// Configuration for the auth layer
///
/// Every path requires authentication unless it is listed explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthLayerConfig {
    /// Exact request paths that skip authentication
    pub public_paths: BTreeSet<String>,
}

impl AuthLayerConfig {
    /// Config with the given public paths
    #[must_use]
    pub fn with_public_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            public_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a public path
    #[must_use]
    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.public_paths.insert(path.into());
        self
    }

    /// Whether `path` skips authentication
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_public_paths() {
        let config = AuthLayerConfig::default();
        assert!(config.public_paths.is_empty());
        assert!(!config.is_public("/health"));
        assert!(!config.is_public("/"));
    }

    #[test]
    fn test_public_paths_match_exactly() {
        let config = AuthLayerConfig::with_public_paths(["/health"]).public_path("/ready");
        assert!(config.is_public("/health"));
        assert!(config.is_public("/ready"));
        assert!(!config.is_public("/health/"));
        assert!(!config.is_public("/healthz"));
        assert!(!config.is_public("/api/me"));
    }
}
