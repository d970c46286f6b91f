//! Bounded HTTP GET shared by discovery and JWKS fetches
//!
//! Every outbound request to the identity provider goes through
//! [`HttpFetcher`], which enforces a request timeout, refuses redirects, caps
//! the body size and only talks HTTPS (plain HTTP is accepted for loopback
//! hosts so a local IdP or a test server can be used).

use crate::error::FetchError;
use http::HeaderMap;
use std::time::Duration;
use tracing::debug;
use url::{Host, Url};

/// Caching instruction parsed from a `Cache-Control` response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    /// `max-age=N`
    MaxAge(Duration),
    /// `no-cache` or `no-store`
    NoCache,
    /// Header absent or carries nothing we understand
    Unspecified,
}

impl CacheDirective {
    /// Parse the `Cache-Control` header from a response
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers
            .get(http::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
        else {
            return Self::Unspecified;
        };

        let value = value.to_ascii_lowercase();
        let directives: Vec<&str> = value.split(',').map(str::trim).collect();

        // no-store and no-cache win over any max-age in the same header
        if directives
            .iter()
            .any(|directive| matches!(*directive, "no-store" | "no-cache"))
        {
            return Self::NoCache;
        }

        directives
            .iter()
            .filter_map(|directive| directive.strip_prefix("max-age="))
            .find_map(|max_age| max_age.trim_matches('"').parse::<u64>().ok())
            .map_or(Self::Unspecified, |seconds| {
                Self::MaxAge(Duration::from_secs(seconds))
            })
    }

    /// Resolve the directive into a freshness lifetime
    pub fn ttl(self, default_ttl: Duration, max_ttl: Duration) -> Duration {
        match self {
            Self::MaxAge(ttl) => ttl.min(max_ttl),
            Self::NoCache => Duration::ZERO,
            Self::Unspecified => default_ttl,
        }
    }
}

/// Body and caching metadata of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Raw response body, at most `max_response_bytes` long
    pub body: Vec<u8>,
    /// Parsed `Cache-Control`
    pub cache: CacheDirective,
}

/// HTTP client with the transport limits used for every IdP request
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl HttpFetcher {
    /// Build a fetcher with the given timeout and body cap
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying client cannot be built
    pub fn new(timeout: Duration, max_response_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("atlas-auth/{}", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_response_bytes,
        })
    }

    /// GET `url` and return its body
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on an insecure URL, timeout, connection failure,
    /// non-2xx status or oversized body
    pub async fn get(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let parsed = ensure_secure_url(url)?;

        debug!(url = %parsed, "Fetching identity provider document");

        let response = self
            .client
            .get(parsed)
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let cache = CacheDirective::from_headers(response.headers());

        if let Some(content_length) = response.content_length()
            && content_length > self.max_response_bytes as u64
        {
            return Err(FetchError::ResponseTooLarge {
                url: url.to_string(),
                limit: self.max_response_bytes,
            });
        }

        let body = response.bytes().await.map_err(|e| classify(url, &e))?;

        if body.len() > self.max_response_bytes {
            return Err(FetchError::ResponseTooLarge {
                url: url.to_string(),
                limit: self.max_response_bytes,
            });
        }

        Ok(FetchedDocument {
            body: body.to_vec(),
            cache,
        })
    }
}

fn classify(url: &str, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Http(error.to_string())
    }
}

/// Parse `raw` and require HTTPS, or HTTP to a loopback host
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] or [`FetchError::InsecureUrl`]
pub fn ensure_secure_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        _ => Err(FetchError::InsecureUrl(raw.to_string())),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
