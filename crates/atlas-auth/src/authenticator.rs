//! Authenticator lifecycle
//!
//! [`Authenticator`] owns the issuer metadata, the key cache and the verifier.
//! It is created by [`Authenticator::init`], which blocks until discovery and
//! the first key set load have succeeded, and stopped by
//! [`Authenticator::shutdown`]. Clones share the same state and are passed
//! explicitly to the middleware.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AuthConfig;
use crate::context::{BearerToken, Principal};
use crate::discovery::{DiscoveryClient, IssuerMetadata};
use crate::error::{AuthError, AuthResult, DiscoveryError};
use crate::http_client::HttpFetcher;
use crate::jwt::{DecodedClaims, KeySetCache, TokenVerifier, VerificationPolicy};

/// Turns a bearer token into a [`Principal`]
///
/// The middleware is generic over this trait so it can be driven by a fake in
/// tests.
#[async_trait]
pub trait BearerAuthenticator: Send + Sync + 'static {
    /// Verify `token` and derive the caller's identity
    async fn authenticate(&self, token: &BearerToken) -> AuthResult<Principal>;
}

struct Inner {
    config: AuthConfig,
    discovery: DiscoveryClient,
    metadata: ArcSwap<IssuerMetadata>,
    verifier: TokenVerifier,
    ready: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// OIDC resource server token validator
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("issuer", &self.inner.metadata.load().issuer)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Validate `config`, discover the provider and load its keys
    ///
    /// When `discovery_refresh_interval_seconds` is set, also starts a
    /// background task that re-runs discovery on that period.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Config`] for an invalid configuration
    /// - [`AuthError::Discovery`] if the discovery document cannot be fetched
    /// - [`AuthError::KeySetUnavailable`] if the key set cannot be loaded or is
    ///   empty
    pub async fn init(config: AuthConfig) -> AuthResult<Self> {
        config.validate()?;

        let http = HttpFetcher::new(config.http_timeout(), config.max_response_bytes)
            .map_err(DiscoveryError::from)?;
        let discovery = DiscoveryClient::new(http.clone());

        let metadata = discovery.fetch(&config.oidc_url).await.map_err(|e| {
            error!(oidc_url = %config.oidc_url, error = %e, "Startup discovery failed");
            AuthError::from(e)
        })?;

        let keys = KeySetCache::new(http, metadata.jwks_uri.clone(), config.key_cache_settings());
        let key_set = keys.load().await.map_err(|e| {
            error!(jwks_uri = %metadata.jwks_uri, error = %e, "Initial JWKS load failed");
            AuthError::KeySetUnavailable(e.to_string())
        })?;

        info!(
            issuer = %metadata.issuer,
            jwks_uri = %metadata.jwks_uri,
            key_count = key_set.len(),
            "Authenticator ready"
        );

        let verifier = TokenVerifier::new(VerificationPolicy::from_config(&config), keys);
        let (shutdown_tx, _) = watch::channel(false);
        let refresh_interval = config.discovery_refresh_interval();

        let authenticator = Self {
            inner: Arc::new(Inner {
                config,
                discovery,
                metadata: ArcSwap::from_pointee(metadata),
                verifier,
                ready: AtomicBool::new(true),
                shutdown_tx,
                tasks: Mutex::new(Vec::new()),
            }),
        };

        if let Some(period) = refresh_interval {
            authenticator.spawn_rediscovery(period);
        }

        Ok(authenticator)
    }

    /// Configuration this instance was built from
    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Current issuer metadata snapshot
    pub fn metadata(&self) -> Arc<IssuerMetadata> {
        self.inner.metadata.load_full()
    }

    /// The key cache
    pub fn key_cache(&self) -> &KeySetCache {
        self.inner.verifier.key_cache()
    }

    /// The verifier
    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }

    /// Whether the instance accepts verification requests
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Run every verification step against `token`
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing check, or
    /// [`AuthError::KeySetUnavailable`] after [`Authenticator::shutdown`]
    pub async fn verify(&self, token: &str) -> AuthResult<DecodedClaims> {
        if !self.is_ready() {
            return Err(AuthError::KeySetUnavailable(
                "authenticator is shut down".to_string(),
            ));
        }

        let metadata = self.metadata();
        self.inner.verifier.verify(token, &metadata).await
    }

    /// Re-run discovery and replace the issuer metadata
    ///
    /// If `jwks_uri` changed, the key cache is re-pointed and loaded from the
    /// new location before the new metadata is published. On any failure the
    /// previous metadata and key set stay in place.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Discovery`] if discovery fails and
    /// [`AuthError::KeySetUnavailable`] if the new key set cannot be loaded
    pub async fn reload(&self) -> AuthResult<Arc<IssuerMetadata>> {
        let metadata = self
            .inner
            .discovery
            .fetch(&self.inner.config.oidc_url)
            .await
            .map_err(|e| {
                warn!(error = %e, "Rediscovery failed, keeping previous metadata");
                AuthError::from(e)
            })?;

        let previous = self.metadata();
        if metadata.jwks_uri != previous.jwks_uri {
            let cache = self.key_cache();
            cache.set_jwks_uri(metadata.jwks_uri.clone());
            if let Err(e) = cache.load().await {
                warn!(
                    jwks_uri = %metadata.jwks_uri,
                    error = %e,
                    "Key set at new location unusable, keeping previous metadata"
                );
                cache.set_jwks_uri(previous.jwks_uri.clone());
                return Err(AuthError::KeySetUnavailable(e.to_string()));
            }
        }

        if metadata.issuer != previous.issuer {
            warn!(
                previous = %previous.issuer,
                issuer = %metadata.issuer,
                "Issuer identifier changed"
            );
        }

        let metadata = Arc::new(metadata);
        self.inner.metadata.store(Arc::clone(&metadata));
        info!(issuer = %metadata.issuer, jwks_uri = %metadata.jwks_uri, "Issuer metadata reloaded");
        Ok(metadata)
    }

    /// Stop background tasks and fail every later verification closed
    pub async fn shutdown(&self) {
        if !self.inner.ready.swap(false, Ordering::AcqRel) {
            return;
        }

        self.inner.shutdown_tx.send_replace(true);

        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        info!("Authenticator shut down");
    }

    fn spawn_rediscovery(&self, period: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut shutdown = self.inner.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; discovery just ran
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        let authenticator = Authenticator { inner };
                        debug!("Running scheduled rediscovery");
                        // Failures are logged by reload and leave state untouched
                        let _ = authenticator.reload().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }

            debug!("Background rediscovery stopped");
        });

        self.inner.tasks.lock().push(handle);
    }
}

#[async_trait]
impl BearerAuthenticator for Authenticator {
    async fn authenticate(&self, token: &BearerToken) -> AuthResult<Principal> {
        self.verify(token.as_str()).await.map(Principal::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_config_fails_before_network() {
        let error = Authenticator::init(AuthConfig::new("http://idp.example/oidc"))
            .await
            .unwrap_err();
        assert!(matches!(error, AuthError::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_fatal() {
        let config = AuthConfig::new("http://127.0.0.1:9/.well-known/openid-configuration")
            .with_http_timeout(2);
        let error = Authenticator::init(config).await.unwrap_err();
        assert_eq!(error.reason_code(), "discovery_failed");
    }
}
