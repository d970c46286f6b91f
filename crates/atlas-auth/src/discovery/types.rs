//! # OpenID Connect Discovery Types
//!
//! [`IssuerMetadata`] is the validated, immutable snapshot of a provider's
//! discovery document. It is created by [`super::DiscoveryClient`] and replaced
//! wholesale on reload, never mutated in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

use crate::error::DiscoveryError;
use crate::http_client::ensure_secure_url;

/// Discovery document as published by the provider
///
/// Only `issuer` and `jwks_uri` matter to a resource server; both are
/// optional here so that their absence is reported as
/// [`DiscoveryError::MissingField`] rather than a generic JSON error.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DiscoveryDocument {
    issuer: Option<String>,
    jwks_uri: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    scopes_supported: Option<Vec<String>>,
    id_token_signing_alg_values_supported: Option<Vec<String>>,
    #[serde(flatten)]
    additional: HashMap<String, serde_json::Value>,
}

/// Validated provider metadata
///
/// ## Example document
///
/// ```json
/// {
///   "issuer": "https://idp.example",
///   "jwks_uri": "https://idp.example/jwks",
///   "authorization_endpoint": "https://idp.example/authorize",
///   "token_endpoint": "https://idp.example/token"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuerMetadata {
    /// Issuer identifier, compared byte-for-byte against `iss`
    pub issuer: String,

    /// Location of the provider's JSON Web Key Set
    pub jwks_uri: String,

    /// Informational
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Informational
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Informational
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// Scopes the provider advertises
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Algorithms the provider signs ID tokens with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,

    /// When the document was fetched
    pub fetched_at: SystemTime,

    /// Fields this crate does not interpret
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl IssuerMetadata {
    /// Minimal metadata with just an issuer and a key set location
    pub fn new(issuer: impl Into<String>, jwks_uri: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_uri: jwks_uri.into(),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            scopes_supported: None,
            id_token_signing_alg_values_supported: None,
            fetched_at: SystemTime::now(),
            additional: HashMap::new(),
        }
    }

    /// Parse and validate a discovery document body
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidJson`] for a body that is not a JSON
    /// object, [`DiscoveryError::MissingField`] when `issuer` or `jwks_uri`
    /// is absent or empty, and [`DiscoveryError::InvalidField`] when
    /// `jwks_uri` is not an acceptable URL
    pub fn from_json(body: &[u8]) -> Result<Self, DiscoveryError> {
        let document: DiscoveryDocument =
            serde_json::from_slice(body).map_err(|e| DiscoveryError::InvalidJson(e.to_string()))?;
        Self::try_from(document)
    }
}

impl TryFrom<DiscoveryDocument> for IssuerMetadata {
    type Error = DiscoveryError;

    fn try_from(document: DiscoveryDocument) -> Result<Self, Self::Error> {
        let issuer = document
            .issuer
            .filter(|issuer| !issuer.is_empty())
            .ok_or(DiscoveryError::MissingField("issuer"))?;

        let jwks_uri = document
            .jwks_uri
            .filter(|uri| !uri.is_empty())
            .ok_or(DiscoveryError::MissingField("jwks_uri"))?;

        ensure_secure_url(&jwks_uri).map_err(|e| DiscoveryError::InvalidField {
            field: "jwks_uri",
            reason: e.to_string(),
        })?;

        Ok(Self {
            issuer,
            jwks_uri,
            authorization_endpoint: document.authorization_endpoint,
            token_endpoint: document.token_endpoint,
            userinfo_endpoint: document.userinfo_endpoint,
            scopes_supported: document.scopes_supported,
            id_token_signing_alg_values_supported: document.id_token_signing_alg_values_supported,
            fetched_at: SystemTime::now(),
            additional: document.additional,
        })
    }
}
