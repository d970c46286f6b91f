//! Token verification through a discovered provider
//!
//! Checks run in a fixed order and the first failure wins. These tests build
//! tokens that fail several checks at once and assert which one is reported.
//!
//! # Standards Tested
//! - RFC 7519: JSON Web Token (JWT)
//! - RFC 8725: JWT Best Current Practice (algorithm allow-listing)

mod common;

use atlas_auth::jwt::SigningKeySet;
use atlas_auth::{AuthError, Authenticator, IssuerMetadata, VerificationPolicy};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::{FakeIdp, JWKS_PATH, TestKey, jwks, mint, now, unsigned};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use proptest::prelude::*;
use serde_json::json;
use std::time::{Duration, SystemTime};

#[tokio::test]
async fn test_rsa_and_ec_tokens_verify() {
    let idp = FakeIdp::with_keys(&[TestKey::K1, TestKey::Ec]).await;
    let authenticator = Authenticator::init(idp.config()).await.unwrap();

    for key in [TestKey::K1, TestKey::Ec] {
        let claims = authenticator.verify(&idp.token(key)).await.unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.kid.as_deref(), Some(key.kid()));
    }
}

#[tokio::test]
async fn test_alg_none_is_rejected_without_key_lookup() {
    // GIVEN: An unsigned token naming a kid the provider does not know
    let idp = FakeIdp::with_keys(&[TestKey::K1]).await;
    let authenticator = Authenticator::init(idp.config()).await.unwrap();
    let token = unsigned(&json!({"alg": "none", "kid": "nope"}), &idp.claims());

    // WHEN: We verify it
    let error = authenticator.verify(&token).await.unwrap_err();

    // THEN: The algorithm check fires before any JWKS refresh
    assert_eq!(error, AuthError::UnsupportedAlgorithm("none".into()));
    assert_eq!(idp.hits(JWKS_PATH).await, 1);
}

#[tokio::test]
async fn test_hmac_token_is_rejected() {
    // GIVEN: A token MACed with the RSA modulus as a shared secret
    let idp = FakeIdp::with_keys(&[TestKey::K1]).await;
    let authenticator = Authenticator::init(idp.config()).await.unwrap();
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("k1".into());
    let secret = TestKey::K1.jwk()["n"].as_str().unwrap().as_bytes().to_vec();
    let token = encode(&header, &idp.claims(), &EncodingKey::from_secret(&secret)).unwrap();

    // WHEN / THEN: Symmetric algorithms never reach signature verification
    let error = authenticator.verify(&token).await.unwrap_err();
    assert_eq!(error, AuthError::UnsupportedAlgorithm("HS256".into()));
}

#[tokio::test]
async fn test_signature_checked_before_expiry() {
    // GIVEN: An expired token whose signature is also wrong
    let idp = FakeIdp::with_keys(&[TestKey::K1, TestKey::K2]).await;
    let authenticator = Authenticator::init(idp.config()).await.unwrap();
    let mut claims = idp.claims();
    claims["exp"] = json!(now() - 3600);
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("k1".into());
    let token = encode(&header, &claims, &TestKey::K2.encoding_key()).unwrap();

    // WHEN / THEN: The signature failure is reported
    let error = authenticator.verify(&token).await.unwrap_err();
    assert!(matches!(error, AuthError::InvalidSignature(_)), "{error:?}");
}

#[tokio::test]
async fn test_issuer_checked_before_expiry() {
    let idp = FakeIdp::with_keys(&[TestKey::K1]).await;
    let authenticator = Authenticator::init(idp.config()).await.unwrap();
    let mut claims = idp.claims();
    claims["iss"] = json!("https://evil.example");
    claims["exp"] = json!(now() - 3600);

    let error = authenticator
        .verify(&mint(TestKey::K1, &claims))
        .await
        .unwrap_err();
    assert_eq!(
        error,
        AuthError::IssuerMismatch {
            expected: idp.issuer(),
            actual: "https://evil.example".into(),
        }
    );
}

#[tokio::test]
async fn test_expiry_checked_before_audience() {
    let idp = FakeIdp::with_keys(&[TestKey::K1]).await;
    let authenticator = Authenticator::init(idp.config().with_audience("atlas-api"))
        .await
        .unwrap();
    let exp = now() - 10;
    let mut claims = idp.claims();
    claims["exp"] = json!(exp);
    claims["aud"] = json!("someone-else");

    let error = authenticator
        .verify(&mint(TestKey::K1, &claims))
        .await
        .unwrap_err();
    assert_eq!(error, AuthError::TokenExpired { exp });
}

#[tokio::test]
async fn test_future_token_is_not_yet_valid() {
    let idp = FakeIdp::with_keys(&[TestKey::K1]).await;
    let authenticator = Authenticator::init(idp.config()).await.unwrap();
    let mut claims = idp.claims();
    claims["nbf"] = json!(now() + 120);

    let error = authenticator
        .verify(&mint(TestKey::K1, &claims))
        .await
        .unwrap_err();
    assert!(matches!(error, AuthError::TokenNotYetValid(_)), "{error:?}");
}

#[tokio::test]
async fn test_audience_enforced_only_when_configured() {
    let idp = FakeIdp::with_keys(&[TestKey::K1]).await;
    let mut claims = idp.claims();
    claims["aud"] = json!(["other-api", "billing"]);
    let token = mint(TestKey::K1, &claims);

    let open = Authenticator::init(idp.config()).await.unwrap();
    assert!(open.verify(&token).await.is_ok());

    let strict = Authenticator::init(idp.config().with_audience("atlas-api"))
        .await
        .unwrap();
    assert_eq!(
        strict.verify(&token).await.unwrap_err(),
        AuthError::AudienceMismatch {
            expected: "atlas-api".into()
        }
    );

    claims["aud"] = json!(["other-api", "atlas-api"]);
    assert!(strict.verify(&mint(TestKey::K1, &claims)).await.is_ok());
}

#[tokio::test]
async fn test_leeway_tolerates_recent_expiry() {
    // GIVEN: A token that expired 10 seconds ago
    let idp = FakeIdp::with_keys(&[TestKey::K1]).await;
    let mut claims = idp.claims();
    claims["exp"] = json!(now() - 10);
    let token = mint(TestKey::K1, &claims);

    // WHEN / THEN: 30 seconds of leeway accept it; none rejects it
    let lenient = Authenticator::init(idp.config().with_leeway(30)).await.unwrap();
    assert!(lenient.verify(&token).await.is_ok());

    let strict = Authenticator::init(idp.config()).await.unwrap();
    assert!(matches!(
        strict.verify(&token).await,
        Err(AuthError::TokenExpired { .. })
    ));
}

#[tokio::test]
async fn test_missing_kid_is_malformed() {
    let idp = FakeIdp::with_keys(&[TestKey::K1]).await;
    let authenticator = Authenticator::init(idp.config()).await.unwrap();
    let token = encode(
        &Header::new(Algorithm::RS256),
        &idp.claims(),
        &TestKey::K1.encoding_key(),
    )
    .unwrap();

    let error = authenticator.verify(&token).await.unwrap_err();
    assert!(matches!(error, AuthError::MalformedToken(_)), "{error:?}");
}

const NOW: i64 = 1_700_000_000;
const ISSUER: &str = "https://idp.example";

fn signed_token() -> String {
    mint(
        TestKey::K1,
        &json!({"iss": ISSUER, "sub": "user-1", "exp": NOW + 60, "iat": NOW - 1}),
    )
}

fn offline_keys() -> SigningKeySet {
    SigningKeySet::from_json(
        &serde_json::to_vec(&jwks(&[TestKey::K1])).unwrap(),
        SystemTime::now(),
        Duration::from_secs(600),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_single_bit_signature_corruption_is_rejected(bit in 0usize..(256 * 8)) {
        let token = signed_token();
        let (signed, signature) = token.rsplit_once('.').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
        bytes[bit / 8] ^= 1 << (bit % 8);
        let corrupted = format!("{}.{}", signed, URL_SAFE_NO_PAD.encode(&bytes));

        let result = VerificationPolicy::default().verify_with_keys(
            &corrupted,
            &IssuerMetadata::new(ISSUER, "https://idp.example/jwks"),
            &offline_keys(),
            NOW,
        );

        prop_assert!(
            matches!(result, Err(AuthError::InvalidSignature(_))),
            "bit {} gave {:?}",
            bit,
            result
        );
    }
}

#[test]
fn test_uncorrupted_token_verifies_offline() {
    let claims = VerificationPolicy::default()
        .verify_with_keys(
            &signed_token(),
            &IssuerMetadata::new(ISSUER, "https://idp.example/jwks"),
            &offline_keys(),
            NOW,
        )
        .unwrap();
    assert_eq!(claims.iss, ISSUER);
}
