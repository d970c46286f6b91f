//! # Discovery Document Fetcher
//!
//! One GET against the configured discovery URL, with the transport limits of
//! [`HttpFetcher`]. No caching here: the document is fetched at startup and on
//! explicit reload only.

use super::types::IssuerMetadata;
use crate::error::DiscoveryError;
use crate::http_client::HttpFetcher;
use tracing::{debug, info, warn};

/// Fetches OpenID Connect discovery documents
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: HttpFetcher,
}

impl DiscoveryClient {
    /// Create a client on top of a shared fetcher
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    /// Fetch and validate the discovery document at `oidc_url`
    ///
    /// `oidc_url` is the full document URL, e.g.
    /// `https://idp.example/.well-known/openid-configuration`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] on network failure, timeout, non-2xx
    /// status, malformed JSON, or a missing `issuer` / `jwks_uri`
    pub async fn fetch(&self, oidc_url: &str) -> Result<IssuerMetadata, DiscoveryError> {
        debug!(oidc_url = %oidc_url, "Fetching discovery document");

        let document = self.http.get(oidc_url).await.map_err(|e| {
            warn!(oidc_url = %oidc_url, error = %e, "Discovery request failed");
            DiscoveryError::from(e)
        })?;

        let metadata = IssuerMetadata::from_json(&document.body).map_err(|e| {
            warn!(oidc_url = %oidc_url, error = %e, "Discovery document rejected");
            e
        })?;

        info!(
            issuer = %metadata.issuer,
            jwks_uri = %metadata.jwks_uri,
            "Discovered OpenID Connect provider"
        );

        Ok(metadata)
    }
}
