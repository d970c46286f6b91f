//! JWKS (JSON Web Key Set) fetching and caching
//!
//! [`KeySetCache`] owns the current [`SigningKeySet`] snapshot and keeps it
//! fresh:
//!
//! - **TTL-based caching**: lifetime from the configured override, else the
//!   IdP's `Cache-Control: max-age` (capped), else a default
//! - **Refresh on miss**: an unknown `kid` or an expired set triggers a refresh
//! - **Single flight**: concurrent callers share one outstanding fetch and
//!   all observe its result
//! - **Throttling**: lookup-triggered refreshes are spaced by a minimum
//!   interval; the first one after a load always runs
//! - **Stale serving**: if a refresh fails, the last good set keeps serving
//!
//! Snapshots are swapped atomically; readers see the old set or the new one,
//! never a mix.

use arc_swap::{ArcSwap, ArcSwapOption};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

use super::keys::{SigningKey, SigningKeySet};
use crate::config::KeyCacheSettings;
use crate::error::{AuthError, FetchError, KeySetError};
use crate::http_client::HttpFetcher;

type SharedRefresh = Shared<BoxFuture<'static, Result<Arc<SigningKeySet>, KeySetError>>>;

/// Outstanding fetch, joined by every concurrent caller for the same location
struct Inflight {
    generation: u64,
    jwks_uri: Arc<String>,
    future: SharedRefresh,
}

#[derive(Default)]
struct RefreshState {
    inflight: Option<Inflight>,
    next_generation: u64,
    /// Start of the most recent refresh triggered by a lookup
    last_lookup_refresh: Option<Instant>,
}

struct CacheInner {
    http: HttpFetcher,
    jwks_uri: ArcSwap<String>,
    settings: KeyCacheSettings,
    snapshot: ArcSwapOption<SigningKeySet>,
    refresh: Mutex<RefreshState>,
    fetch_attempts: AtomicU64,
    fetch_failures: AtomicU64,
}

/// What a non-forced refresh request resolved to
enum RefreshStart {
    /// Wait on this fetch
    Fetch(SharedRefresh),
    /// Another caller already swapped in a newer snapshot
    Newer(Arc<SigningKeySet>),
    /// Too soon after the previous attempt
    Throttled,
}

/// Point-in-time view of the cache for logs and health checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySetStats {
    /// Current key set location
    pub jwks_uri: String,
    /// JWKS fetches started
    pub fetch_attempts: u64,
    /// JWKS fetches that failed
    pub fetch_failures: u64,
    /// Keys in the current snapshot
    pub key_count: usize,
    /// Age of the current snapshot
    pub snapshot_age: Option<Duration>,
    /// Whether the current snapshot is within its freshness window
    pub fresh: bool,
}

/// Self-refreshing cache of the provider's signing keys
///
/// # Example
///
/// ```rust,no_run
/// # use atlas_auth::jwt::KeySetCache;
/// # use atlas_auth::config::KeyCacheSettings;
/// # use atlas_auth::http_client::HttpFetcher;
/// # use std::time::Duration;
/// # tokio_test::block_on(async {
/// let http = HttpFetcher::new(Duration::from_secs(10), 256 * 1024)?;
/// let cache = KeySetCache::new(http, "https://idp.example/jwks", KeyCacheSettings::default());
///
/// cache.load().await?;
/// let key = cache.get_key("k1").await?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Clone)]
pub struct KeySetCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("jwks_uri", &self.jwks_uri())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl KeySetCache {
    /// Create an empty cache for `jwks_uri`; call [`KeySetCache::load`] before use
    pub fn new(http: HttpFetcher, jwks_uri: impl Into<String>, settings: KeyCacheSettings) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                http,
                jwks_uri: ArcSwap::from_pointee(jwks_uri.into()),
                settings,
                snapshot: ArcSwapOption::empty(),
                refresh: Mutex::new(RefreshState::default()),
                fetch_attempts: AtomicU64::new(0),
                fetch_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Current key set location
    pub fn jwks_uri(&self) -> String {
        self.inner.jwks_uri.load().as_ref().clone()
    }

    /// Current snapshot, fresh or not
    pub fn current(&self) -> Option<Arc<SigningKeySet>> {
        self.inner.snapshot.load_full()
    }

    /// Fetch now, bypassing freshness and the refresh throttle
    ///
    /// Joins a refresh already in flight for the current location. A fetch
    /// still running against a previous location is superseded, so the result
    /// always comes from [`KeySetCache::jwks_uri`].
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError`] if the set cannot be fetched or contains no
    /// usable keys
    pub async fn load(&self) -> Result<Arc<SigningKeySet>, KeySetError> {
        let shared = {
            let mut state = self.inner.refresh.lock();
            self.join_or_start(&mut state)
        };
        shared.await
    }

    /// Point the cache at a new location
    ///
    /// Takes effect on the next fetch; the current snapshot keeps serving
    /// until then. Follow with [`KeySetCache::load`] to fetch immediately.
    /// A fetch from the previous location that completes later is not
    /// published.
    pub fn set_jwks_uri(&self, jwks_uri: impl Into<String>) {
        let jwks_uri = jwks_uri.into();
        info!(jwks_uri = %jwks_uri, "Key set location changed");
        self.inner.jwks_uri.store(Arc::new(jwks_uri));
    }

    /// Resolve `kid` to a verification key
    ///
    /// Serves from the current snapshot while it is fresh and knows the
    /// `kid`. Otherwise performs (or joins) a single refresh and retries the
    /// lookup once against its result.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnknownKey`] if the key is still absent after refreshing
    /// - [`AuthError::KeySetUnavailable`] if no key set was ever loaded
    pub async fn get_key(&self, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        let observed = self.current();

        if let Some(set) = &observed
            && set.is_fresh()
            && let Some(key) = set.get(kid)
        {
            debug!(kid = %kid, "JWKS cache hit");
            return Ok(Arc::clone(key));
        }

        let set = match self.start_refresh(observed.as_ref()) {
            RefreshStart::Fetch(shared) => match shared.await {
                Ok(set) => set,
                Err(error) => self.stale_or_unavailable(error)?,
            },
            RefreshStart::Newer(set) => set,
            RefreshStart::Throttled => {
                let set = observed.ok_or_else(|| {
                    AuthError::KeySetUnavailable("no key set loaded".to_string())
                })?;
                warn!(
                    kid = %kid,
                    jwks_uri = %self.jwks_uri(),
                    "JWKS refresh throttled, using cached key set"
                );
                set
            }
        };

        set.get(kid).cloned().ok_or_else(|| AuthError::UnknownKey {
            kid: kid.to_string(),
        })
    }

    /// Counters and snapshot details
    pub fn stats(&self) -> KeySetStats {
        let snapshot = self.current();
        KeySetStats {
            jwks_uri: self.jwks_uri(),
            fetch_attempts: self.inner.fetch_attempts.load(Ordering::Relaxed),
            fetch_failures: self.inner.fetch_failures.load(Ordering::Relaxed),
            key_count: snapshot.as_ref().map_or(0, |set| set.len()),
            snapshot_age: snapshot
                .as_ref()
                .and_then(|set| SystemTime::now().duration_since(set.fetched_at()).ok()),
            fresh: snapshot.as_ref().is_some_and(|set| set.is_fresh()),
        }
    }

    fn stale_or_unavailable(&self, error: KeySetError) -> Result<Arc<SigningKeySet>, AuthError> {
        match self.current() {
            Some(set) => {
                warn!(
                    jwks_uri = %self.jwks_uri(),
                    error = %error,
                    key_count = set.len(),
                    "JWKS refresh failed, serving stale key set"
                );
                Ok(set)
            }
            None => Err(AuthError::KeySetUnavailable(error.to_string())),
        }
    }

    /// Start or join a refresh on behalf of a lookup
    ///
    /// `observed` is the snapshot the caller saw before deciding to refresh.
    /// If another caller has swapped in a newer one since, that one is used
    /// without fetching again.
    fn start_refresh(&self, observed: Option<&Arc<SigningKeySet>>) -> RefreshStart {
        let mut state = self.inner.refresh.lock();

        if state.inflight.is_none() {
            if let Some(current) = self.inner.snapshot.load_full()
                && !observed.is_some_and(|seen| Arc::ptr_eq(seen, &current))
            {
                return RefreshStart::Newer(current);
            }

            if let Some(last) = state.last_lookup_refresh
                && last.elapsed() < self.inner.settings.min_refresh_interval
            {
                return RefreshStart::Throttled;
            }

            state.last_lookup_refresh = Some(Instant::now());
        }

        RefreshStart::Fetch(self.join_or_start(&mut state))
    }

    fn join_or_start(&self, state: &mut RefreshState) -> SharedRefresh {
        let jwks_uri = self.inner.jwks_uri.load_full();

        if let Some(inflight) = &state.inflight {
            if inflight.jwks_uri == jwks_uri {
                debug!("Joining in-flight JWKS refresh");
                return inflight.future.clone();
            }
            debug!(
                previous = %inflight.jwks_uri,
                jwks_uri = %jwks_uri,
                "Superseding JWKS refresh for previous location"
            );
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let future = Self::fetch_and_swap(Arc::downgrade(&self.inner), generation, Arc::clone(&jwks_uri))
            .boxed()
            .shared();
        state.inflight = Some(Inflight {
            generation,
            jwks_uri,
            future: future.clone(),
        });
        future
    }

    async fn fetch_and_swap(
        inner: Weak<CacheInner>,
        generation: u64,
        jwks_uri: Arc<String>,
    ) -> Result<Arc<SigningKeySet>, KeySetError> {
        let Some(inner) = inner.upgrade() else {
            return Err(KeySetError::Fetch(FetchError::Http(
                "key set cache dropped".to_string(),
            )));
        };

        let result = Self::fetch(&inner, &jwks_uri).await;

        match &result {
            Ok(set) if **inner.jwks_uri.load() == *jwks_uri => {
                inner.snapshot.store(Some(Arc::clone(set)));
            }
            Ok(_) => {
                debug!(jwks_uri = %jwks_uri, "Discarding key set from previous location");
            }
            Err(_) => {
                inner.fetch_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut state = inner.refresh.lock();
        if state
            .inflight
            .as_ref()
            .is_some_and(|inflight| inflight.generation == generation)
        {
            state.inflight = None;
        }
        result
    }

    async fn fetch(inner: &CacheInner, jwks_uri: &str) -> Result<Arc<SigningKeySet>, KeySetError> {
        inner.fetch_attempts.fetch_add(1, Ordering::Relaxed);

        debug!(jwks_uri = %jwks_uri, "Fetching JWKS");

        let document = inner.http.get(jwks_uri).await.map_err(|e| {
            warn!(jwks_uri = %jwks_uri, error = %e, "Failed to fetch JWKS");
            KeySetError::from(e)
        })?;

        let ttl = inner.settings.ttl_override.unwrap_or_else(|| {
            document
                .cache
                .ttl(inner.settings.default_ttl, inner.settings.max_ttl)
        });

        let set = SigningKeySet::from_json(&document.body, SystemTime::now(), ttl).map_err(|e| {
            warn!(jwks_uri = %jwks_uri, error = %e, "Rejected JWKS document");
            e
        })?;

        info!(
            jwks_uri = %jwks_uri,
            key_count = set.len(),
            ttl_secs = ttl.as_secs(),
            "Loaded JWKS"
        );

        Ok(Arc::new(set))
    }
}
