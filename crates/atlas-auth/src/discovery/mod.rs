//! # OpenID Connect Discovery
//!
//! Fetches the provider's discovery document once at startup (and on explicit
//! reload) and turns it into an [`IssuerMetadata`] snapshot. Never called on
//! the request path.
//!
//! ## Security Features
//!
//! - **HTTPS Only**: plain HTTP is refused except for loopback hosts
//! - **No Redirects**: redirect following is disabled
//! - **Size Limits**: body capped at `max_response_bytes`
//! - **Timeouts**: bounded by `http_timeout_seconds`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use atlas_auth::discovery::DiscoveryClient;
//! use atlas_auth::http_client::HttpFetcher;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let http = HttpFetcher::new(Duration::from_secs(10), 256 * 1024)?;
//! let metadata = DiscoveryClient::new(http)
//!     .fetch("https://idp.example/.well-known/openid-configuration")
//!     .await?;
//!
//! println!("issuer {} publishes keys at {}", metadata.issuer, metadata.jwks_uri);
//! # Ok(())
//! # }
//! ```

pub mod fetcher;
pub mod types;

pub use fetcher::DiscoveryClient;
pub use types::IssuerMetadata;
