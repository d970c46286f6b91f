//! # Atlas Auth - OpenID Connect Resource Server Validation
//!
//! Validates bearer access tokens issued by an external OpenID Connect
//! provider. The provider is discovered once at startup, its signing keys are
//! cached and refreshed on demand, and every token runs through a fixed,
//! ordered sequence of checks before the request reaches a handler.
//!
//! ## Design Principles
//!
//! - **Fail Closed**: a token is rejected unless every check passes
//! - **One Fetch At A Time**: concurrent key lookups share a single JWKS refresh
//! - **Immutable Snapshots**: issuer metadata and key sets are swapped, never mutated
//! - **Explicit State**: no globals; the [`Authenticator`] is passed to the middleware
//!
//! ## Architecture
//!
//! - [`config`] - [`AuthConfig`] and its validation
//! - [`discovery`] - Discovery client and [`IssuerMetadata`]
//! - [`jwt`] - Key set cache and token verifier
//! - [`authenticator`] - Lifecycle: init, reload, shutdown
//! - [`context`] - [`BearerToken`] extraction and the [`Principal`] handed to handlers
//! - [`tower`] - Tower layer that authenticates every inbound request
//! - [`http_client`] - Bounded HTTPS fetches shared by discovery and JWKS
//!
//! ## Verification Order
//!
//! 1. Structure (three base64url segments, JSON header and payload)
//! 2. Algorithm allow-list (`none` and HMAC are always refused)
//! 3. Key lookup by `kid`, refreshing the key set on a miss
//! 4. Signature
//! 5. Issuer (exact match)
//! 6. Expiry
//! 7. Not-before and issued-at
//! 8. Audience (when configured)
//!
//! The first failing check decides the error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use atlas_auth::{AuthConfig, Authenticator};
//!
//! # async fn example() -> Result<(), atlas_auth::AuthError> {
//! let config = AuthConfig::new("https://idp.example/.well-known/openid-configuration")
//!     .with_audience("atlas-api")
//!     .with_leeway(30);
//!
//! let authenticator = Authenticator::init(config).await?;
//! let claims = authenticator.verify("eyJhbGciOi...").await?;
//! println!("authenticated {}", claims.sub);
//!
//! authenticator.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower `AuthLayer`/`AuthService`
//! - `axum` - `FromRequestParts` for [`Principal`]
//!
//! ## Standards
//!
//! - **OpenID Connect Discovery 1.0**
//! - **RFC 7517** - JSON Web Key (JWK)
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **RFC 6750** - Bearer Token Usage

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod authenticator;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod http_client;
pub mod jwt;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

#[doc(inline)]
pub use authenticator::{Authenticator, BearerAuthenticator};

#[doc(inline)]
pub use config::{AuthConfig, KeyCacheSettings};

#[doc(inline)]
pub use context::{BearerToken, Principal};

#[doc(inline)]
pub use discovery::{DiscoveryClient, IssuerMetadata};

#[doc(inline)]
pub use error::{AuthError, AuthResult, ConfigError, DiscoveryError, FetchError, KeySetError};

#[doc(inline)]
pub use jwt::{DecodedClaims, KeySetCache, TokenVerifier, VerificationPolicy};

#[cfg(feature = "middleware")]
#[doc(inline)]
pub use self::tower::{AuthLayer, AuthLayerConfig};

pub use jsonwebtoken::Algorithm;
