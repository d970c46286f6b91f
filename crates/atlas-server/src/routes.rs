//! HTTP routes
//!
//! Every route sits behind [`AuthLayer`]; only paths listed in
//! `public_routes` skip it.

use atlas_auth::{AuthLayer, AuthLayerConfig, Authenticator, Principal};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn router(authenticator: Authenticator, public_routes: &[String]) -> Router {
    let auth = AuthLayer::with_config(
        authenticator,
        AuthLayerConfig::with_public_paths(public_routes.iter().cloned()),
    );

    Router::new()
        .route("/health", get(health))
        .route("/api/me", get(me))
        .layer(auth)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// The caller's identity, as derived from their token
async fn me(principal: Principal) -> Json<Principal> {
    Json(principal)
}
