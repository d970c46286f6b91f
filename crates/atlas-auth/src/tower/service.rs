//! Tower Service implementation for authentication
//!
//! Per request:
//!
//! ```text
//! Unauthenticated ─(public path)──────────────────────────────▶ inner
//!        │
//!        ├─(no "Bearer <token>")─────────────────────────────▶ 401
//!        │
//!   TokenPresent ─(authenticate fails)───────────────────────▶ 401 / 503
//!        │
//!   Authenticated ─(Principal in extensions)─────────────────▶ inner
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, HeaderValue, WWW_AUTHENTICATE};
use http::{Request, Response, StatusCode};
use tower_service::Service;
use tracing::{debug, warn};

use crate::authenticator::BearerAuthenticator;
use crate::context::BearerToken;
use crate::error::AuthError;

use super::AuthLayerConfig;

const UNAUTHORIZED_BODY: &str = r#"{"detail":"Not authenticated"}"#;
const UNAVAILABLE_BODY: &str = r#"{"detail":"Authentication temporarily unavailable"}"#;
const INTERNAL_BODY: &str = r#"{"detail":"Internal server error"}"#;

/// Tower Service that performs authentication
///
/// Extracts the bearer token, runs it through the authenticator and inserts
/// the resulting [`Principal`](crate::Principal) into the request's extensions
/// before forwarding to the inner service.
///
/// # Type Parameters
///
/// * `S` - The inner service type
/// * `A` - The authenticator type
pub struct AuthService<S, A> {
    inner: S,
    authenticator: Arc<A>,
    config: AuthLayerConfig,
}

impl<S: Clone, A> Clone for AuthService<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            authenticator: Arc::clone(&self.authenticator),
            config: self.config.clone(),
        }
    }
}

impl<S: std::fmt::Debug, A> std::fmt::Debug for AuthService<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, A> AuthService<S, A>
where
    A: BearerAuthenticator,
{
    /// Create a new auth service
    pub fn new(inner: S, authenticator: Arc<A>, config: AuthLayerConfig) -> Self {
        Self {
            inner,
            authenticator,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Future type for auth service responses
pub type AuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// Response for a rejected request; never mentions the failure kind
fn rejection<ResBody>(error: &AuthError) -> Response<ResBody>
where
    ResBody: From<&'static str>,
{
    let status = error.status_code();
    let body = match status {
        StatusCode::UNAUTHORIZED => UNAUTHORIZED_BODY,
        StatusCode::SERVICE_UNAVAILABLE => UNAVAILABLE_BODY,
        _ => INTERNAL_BODY,
    };

    let mut response = Response::new(ResBody::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

impl<S, A, B, ResBody> Service<Request<B>> for AuthService<S, A>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    A: BearerAuthenticator,
    B: Send + 'static,
    ResBody: From<&'static str> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = AuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // The clone may not be ready; swap it in and drive the one we polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.config.is_public(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let authenticator = Arc::clone(&self.authenticator);

        Box::pin(async move {
            let result = match BearerToken::from_headers(req.headers()) {
                Ok(token) => authenticator.authenticate(&token).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(principal) => {
                    debug!(
                        subject = %principal.subject,
                        path = %req.uri().path(),
                        "Request authenticated"
                    );
                    req.extensions_mut().insert(principal);
                    inner.call(req).await
                }
                Err(error) => {
                    warn!(
                        reason = error.reason_code(),
                        method = %req.method(),
                        path = %req.uri().path(),
                        status = error.status_code().as_u16(),
                        "Request rejected"
                    );
                    Ok(rejection(&error))
                }
            }
        })
    }
}
