//! Common test utilities for integration tests
//!
//! A wiremock-backed fake identity provider serving a discovery document and a
//! JWKS, plus helpers to mint tokens with the fixture keys.

#![allow(dead_code)]

use atlas_auth::AuthConfig;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/jwks";

const K1_PEM: &[u8] = include_bytes!("../fixtures/k1.pem");
const K2_PEM: &[u8] = include_bytes!("../fixtures/k2.pem");
const EC_PEM: &[u8] = include_bytes!("../fixtures/ec.pem");

const K1_N: &str = "saIw2BcJE_4cZV7jrwl9SFsiGhNbn6v8koTSyuD3sAZQRhtanU0_eYMoQnZOxqHVoIIEog4gTlkENhykOqJWI4iewvidwnET3VYIyzMmxFl-IFB4XePIiEfiWc0E5l91j0yvD8ZiM85GiudzuIg9ROaGAYL7g0A0Bc8bKzjXW8lcRNs1HR8B4unwwgyLVdZjTB6EWzE7uDmgDZDPtKe-FCcsdv6pX_WadITTuqAb6ixlWBRvvFYdXPTfuJqDcnWw1lPbojwCH2EQg91ktzRfn1NR_L5sf8MzlQ7F9z5wLiAx8ka3ak_hmPdlkDd6dNXb6BFBhITGHmwO3JCcc-AFuw";
const K2_N: &str = "tR4KiooSuVhAfvWtmSDGJo1D-7JSCcG1vUzIOpRXZSGydqcazNc089YOfDN3h6_03XcP3nBqDhV-X03I5c2ZNVadtWeLisvm_q2CualVcIoSRqci5XVsweOB2XUbqF_wdTMR_Y664BlFP6yY63atrDFabJ8yXoENeeZpdFBU7czC9MgQ3BtvAAI_sCj8dhUzDsWzaL9Q4NfASTd0scGSBDed7ZoWNcCaDs46ANZCB1-MXq6-swCGjzf5HOAZG1GgVHHQSogaYwxQLHNSRtpRCrVQs9C8-CjWpkfQJ4AzC0gYuyM8_oPHi47jP5yfnP94-W-Lvtd0d50H8isE8ejMwQ";
const EC_X: &str = "fVpqkQL5QinP-1YqI8iCVMp_XcxQBrElDIbYllYTwWQ";
const EC_Y: &str = "oG2Bewc97yVCZWp916zd7AbD64m1QVpN8w1ZDjTYBIU";

/// Fixture signing keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKey {
    /// RSA, kid `k1`
    K1,
    /// RSA, kid `k2`
    K2,
    /// P-256, kid `ec1`
    Ec,
}

impl TestKey {
    pub fn kid(self) -> &'static str {
        match self {
            TestKey::K1 => "k1",
            TestKey::K2 => "k2",
            TestKey::Ec => "ec1",
        }
    }

    pub fn algorithm(self) -> Algorithm {
        match self {
            TestKey::K1 | TestKey::K2 => Algorithm::RS256,
            TestKey::Ec => Algorithm::ES256,
        }
    }

    /// Public JWK as published by the provider
    pub fn jwk(self) -> Value {
        match self {
            TestKey::K1 => rsa_jwk("k1", K1_N),
            TestKey::K2 => rsa_jwk("k2", K2_N),
            TestKey::Ec => json!({
                "kty": "EC",
                "kid": "ec1",
                "use": "sig",
                "alg": "ES256",
                "crv": "P-256",
                "x": EC_X,
                "y": EC_Y,
            }),
        }
    }

    pub fn encoding_key(self) -> EncodingKey {
        match self {
            TestKey::K1 => EncodingKey::from_rsa_pem(K1_PEM).unwrap(),
            TestKey::K2 => EncodingKey::from_rsa_pem(K2_PEM).unwrap(),
            TestKey::Ec => EncodingKey::from_ec_pem(EC_PEM).unwrap(),
        }
    }
}

fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({"kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": n, "e": "AQAB"})
}

/// JWKS document containing `keys`
pub fn jwks(keys: &[TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|key| key.jwk()).collect::<Vec<_>>() })
}

/// JWKS response with a `Cache-Control: max-age` header
pub fn jwks_response(keys: &[TestKey], max_age: u64) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("cache-control", format!("public, max-age={}", max_age).as_str())
        .set_body_json(jwks(keys))
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Sign `claims` with `key`, putting its kid in the header
pub fn mint(key: TestKey, claims: &Value) -> String {
    let mut header = Header::new(key.algorithm());
    header.kid = Some(key.kid().to_string());
    encode(&header, claims, &key.encoding_key()).unwrap()
}

/// Token with an arbitrary header and an empty signature
pub fn unsigned(header: &Value, claims: &Value) -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap()),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap())
    )
}

/// Wiremock-backed OpenID provider
pub struct FakeIdp {
    pub server: MockServer,
}

impl FakeIdp {
    /// Start a provider whose issuer is the mock server's base URL
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start a provider serving discovery and a JWKS with `keys`
    pub async fn with_keys(keys: &[TestKey]) -> Self {
        let idp = Self::start().await;
        idp.mount_discovery().await;
        idp.mount_jwks(keys, 3600).await;
        idp
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn discovery_url(&self) -> String {
        format!("{}{}", self.server.uri(), DISCOVERY_PATH)
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Config pointed at this provider, without refresh throttling
    pub fn config(&self) -> AuthConfig {
        AuthConfig::new(self.discovery_url())
            .with_min_refresh_interval(0)
            .with_http_timeout(5)
    }

    pub fn discovery_document(&self, jwks_path: &str) -> Value {
        let issuer = self.issuer();
        json!({
            "issuer": issuer,
            "jwks_uri": format!("{}{}", issuer, jwks_path),
            "authorization_endpoint": format!("{}/authorize", issuer),
            "token_endpoint": format!("{}/token", issuer),
            "id_token_signing_alg_values_supported": ["RS256", "ES256"],
        })
    }

    pub async fn mount_discovery(&self) {
        self.mount_discovery_with_jwks_path(JWKS_PATH).await;
    }

    pub async fn mount_discovery_with_jwks_path(&self, jwks_path: &str) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.discovery_document(jwks_path)))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_jwks(&self, keys: &[TestKey], max_age: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(jwks_response(keys, max_age))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the provider received for `request_path`
    pub async fn hits(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }

    /// Claims valid for the next five minutes
    pub fn claims(&self) -> Value {
        let now = now();
        json!({
            "iss": self.issuer(),
            "sub": "user-1",
            "aud": "atlas-api",
            "exp": now + 300,
            "iat": now - 5,
            "scope": "openid profile",
            "email": "ada@example.com",
        })
    }

    /// Valid token signed with `key`
    pub fn token(&self, key: TestKey) -> String {
        mint(key, &self.claims())
    }
}

/// Default time allowed for a background task to act
pub const SETTLE: Duration = Duration::from_millis(200);
