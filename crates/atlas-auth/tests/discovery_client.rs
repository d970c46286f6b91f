//! Discovery client tests against a fake provider
//!
//! Covers:
//! - Issuer identifier preserved byte-for-byte
//! - Missing or insecure required fields
//! - Transport limits (redirects, size cap, timeout)

mod common;

use atlas_auth::discovery::DiscoveryClient;
use atlas_auth::http_client::HttpFetcher;
use atlas_auth::{DiscoveryError, FetchError};
use common::{DISCOVERY_PATH, FakeIdp};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn client() -> DiscoveryClient {
    DiscoveryClient::new(HttpFetcher::new(Duration::from_secs(2), 16 * 1024).unwrap())
}

async fn serve(idp: &FakeIdp, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(response)
        .mount(&idp.server)
        .await;
}

#[tokio::test]
async fn test_discovery_keeps_optional_metadata() {
    // GIVEN: A provider with a complete discovery document
    let idp = FakeIdp::start().await;
    idp.mount_discovery().await;

    // WHEN: We discover it
    let metadata = client().fetch(&idp.discovery_url()).await.unwrap();

    // THEN: Required and optional fields are captured
    assert_eq!(metadata.issuer, idp.issuer());
    assert_eq!(metadata.jwks_uri, idp.jwks_uri());
    assert_eq!(
        metadata.token_endpoint.as_deref(),
        Some(format!("{}/token", idp.issuer()).as_str())
    );
    assert_eq!(
        metadata.id_token_signing_alg_values_supported,
        Some(vec!["RS256".to_string(), "ES256".to_string()])
    );
}

#[tokio::test]
async fn test_issuer_is_not_normalized() {
    // GIVEN: An issuer with a trailing slash
    let idp = FakeIdp::start().await;
    let issuer = format!("{}/", idp.issuer());
    serve(
        &idp,
        ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "jwks_uri": idp.jwks_uri(),
        })),
    )
    .await;

    // WHEN: We discover it
    let metadata = client().fetch(&idp.discovery_url()).await.unwrap();

    // THEN: The slash survives; issuer comparison is exact
    assert_eq!(metadata.issuer, issuer);
}

#[tokio::test]
async fn test_missing_jwks_uri_is_rejected() {
    let idp = FakeIdp::start().await;
    serve(
        &idp,
        ResponseTemplate::new(200).set_body_json(json!({ "issuer": idp.issuer() })),
    )
    .await;

    let error = client().fetch(&idp.discovery_url()).await.unwrap_err();
    assert_eq!(error, DiscoveryError::MissingField("jwks_uri"));
}

#[tokio::test]
async fn test_plain_http_jwks_uri_is_rejected() {
    let idp = FakeIdp::start().await;
    serve(
        &idp,
        ResponseTemplate::new(200).set_body_json(json!({
            "issuer": idp.issuer(),
            "jwks_uri": "http://keys.example/jwks",
        })),
    )
    .await;

    let error = client().fetch(&idp.discovery_url()).await.unwrap_err();
    assert!(
        matches!(error, DiscoveryError::InvalidField { field: "jwks_uri", .. }),
        "{error:?}"
    );
}

#[tokio::test]
async fn test_redirect_is_not_followed() {
    // GIVEN: The discovery URL redirects elsewhere
    let idp = FakeIdp::start().await;
    serve(
        &idp,
        ResponseTemplate::new(302).insert_header("location", idp.jwks_uri().as_str()),
    )
    .await;

    // WHEN: We discover it
    let error = client().fetch(&idp.discovery_url()).await.unwrap_err();

    // THEN: The redirect surfaces as a status error
    assert!(
        matches!(error, DiscoveryError::Fetch(FetchError::Status { status: 302, .. })),
        "{error:?}"
    );
}

#[tokio::test]
async fn test_oversized_document_is_rejected() {
    let idp = FakeIdp::start().await;
    let padding = "x".repeat(32 * 1024);
    serve(
        &idp,
        ResponseTemplate::new(200).set_body_json(json!({
            "issuer": idp.issuer(),
            "jwks_uri": idp.jwks_uri(),
            "padding": padding,
        })),
    )
    .await;

    let error = client().fetch(&idp.discovery_url()).await.unwrap_err();
    assert!(
        matches!(error, DiscoveryError::Fetch(FetchError::ResponseTooLarge { .. })),
        "{error:?}"
    );
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let idp = FakeIdp::start().await;
    serve(
        &idp,
        ResponseTemplate::new(200)
            .set_body_json(idp.discovery_document("/jwks"))
            .set_delay(Duration::from_secs(5)),
    )
    .await;

    let error = client().fetch(&idp.discovery_url()).await.unwrap_err();
    assert!(
        matches!(error, DiscoveryError::Fetch(FetchError::Timeout(_))),
        "{error:?}"
    );
}
