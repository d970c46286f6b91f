//! JWT infrastructure for bearer token validation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        TokenVerifier         │
//! │  VerificationPolicy (pure)   │
//! └──────────────┬───────────────┘
//!                │ get_key(kid)
//! ┌──────────────▼───────────────┐
//! │         KeySetCache          │
//! │  single-flight JWKS refresh  │
//! └──────────────┬───────────────┘
//!                │ Arc<SigningKeySet>
//! ┌──────────────▼───────────────┐
//! │        SigningKeySet         │
//! │   immutable kid -> key map   │
//! └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `claims` - typed token payload
//! - `keys` - JWKS parsing into verification keys
//! - `jwks` - key set caching and refresh
//! - `validator` - ordered verification checks

pub mod claims;
pub mod jwks;
pub mod keys;
pub mod validator;

pub use claims::{Audience, DecodedClaims};
pub use jwks::{KeySetCache, KeySetStats};
pub use keys::{SigningKey, SigningKeySet};
pub use validator::{TokenVerifier, UnverifiedToken, VerificationPolicy, unix_now};
