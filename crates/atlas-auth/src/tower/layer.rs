//! Tower Layer implementation for authentication

use std::sync::Arc;
use tower::Layer;

use crate::authenticator::BearerAuthenticator;

use super::AuthLayerConfig;
use super::service::AuthService;

/// Tower Layer that adds bearer authentication to services
///
/// # Example
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use atlas_auth::tower::AuthLayer;
///
/// let auth_layer = AuthLayer::new(authenticator);
///
/// let service = ServiceBuilder::new()
///     .layer(auth_layer)
///     .service(my_inner_service);
/// ```
pub struct AuthLayer<A> {
    authenticator: Arc<A>,
    config: AuthLayerConfig,
}

impl<A> Clone for AuthLayer<A> {
    fn clone(&self) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
            config: self.config.clone(),
        }
    }
}

impl<A> std::fmt::Debug for AuthLayer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthLayer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<A> AuthLayer<A>
where
    A: BearerAuthenticator,
{
    /// Layer with no public paths
    pub fn new(authenticator: A) -> Self {
        Self::from_arc_with_config(Arc::new(authenticator), AuthLayerConfig::default())
    }

    /// Layer with a custom configuration
    pub fn with_config(authenticator: A, config: AuthLayerConfig) -> Self {
        Self::from_arc_with_config(Arc::new(authenticator), config)
    }

    /// Layer from a shared authenticator
    pub fn from_arc_with_config(authenticator: Arc<A>, config: AuthLayerConfig) -> Self {
        Self {
            authenticator,
            config,
        }
    }

    /// Exempt `path` from authentication
    #[must_use]
    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.config.public_paths.insert(path.into());
        self
    }

    /// Layer configuration
    pub fn config(&self) -> &AuthLayerConfig {
        &self.config
    }
}

impl<S, A> Layer<S> for AuthLayer<A>
where
    A: BearerAuthenticator,
{
    type Service = AuthService<S, A>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService::new(inner, Arc::clone(&self.authenticator), self.config.clone())
    }
}
