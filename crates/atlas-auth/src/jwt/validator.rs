//! Bearer token verification
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. three base64url segments with JSON header and claims
//! 2. header algorithm is allow-listed (`none` and `HS*` never are)
//! 3. `kid` resolves to a key
//! 4. signature verifies under that key
//! 5. `iss` equals the discovered issuer byte-for-byte
//! 6. `exp` has not passed
//! 7. `iat` / `nbf` are not in the future
//! 8. `aud` contains the expected audience, when one is configured
//!
//! [`VerificationPolicy`] holds the pure decision logic over
//! (token, metadata, key set, now). [`TokenVerifier`] pairs it with the
//! [`KeySetCache`] for request-time use.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode};
use serde::Deserialize;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::claims::DecodedClaims;
use super::jwks::KeySetCache;
use super::keys::{SigningKey, SigningKeySet};
use crate::config::{AuthConfig, default_allowed_algorithms};
use crate::discovery::IssuerMetadata;
use crate::error::AuthError;

/// Seconds since the Unix epoch
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// A token that passed the structural and algorithm checks but whose
/// signature has not been verified yet
#[derive(Debug, Clone)]
pub struct UnverifiedToken<'a> {
    raw: &'a str,
    algorithm: Algorithm,
    kid: Option<String>,
    claims: DecodedClaims,
}

impl UnverifiedToken<'_> {
    /// Header algorithm
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Header `kid`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedToken`] when the header has no `kid`
    pub fn kid(&self) -> Result<&str, AuthError> {
        self.kid
            .as_deref()
            .ok_or_else(|| AuthError::MalformedToken("header has no kid".to_string()))
    }

    /// Claims, untrusted until the signature is checked
    pub fn claims(&self) -> &DecodedClaims {
        &self.claims
    }
}

/// Algorithm allow-list, clock leeway and audience requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPolicy {
    allowed_algorithms: Vec<Algorithm>,
    leeway: u64,
    expected_audience: Option<String>,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            allowed_algorithms: default_allowed_algorithms(),
            leeway: 0,
            expected_audience: None,
        }
    }
}

impl VerificationPolicy {
    /// Policy described by `config`
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            allowed_algorithms: config.allowed_algorithms.clone(),
            leeway: config.clock_skew_leeway_seconds,
            expected_audience: config.expected_audience.clone(),
        }
    }

    /// Set the clock skew leeway in seconds
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    /// Require `audience` in `aud`
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    /// Replace the algorithm allow-list
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    /// Steps 1 and 2: structure and algorithm
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedToken`] or
    /// [`AuthError::UnsupportedAlgorithm`]
    pub fn inspect<'a>(&self, token: &'a str) -> Result<UnverifiedToken<'a>, AuthError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AuthError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let header: RawHeader = decode_segment(header, "header")?;
        let claims: DecodedClaims = decode_segment(payload, "payload")?;
        // Empty for unsigned (`alg: none`) tokens, which step 2 rejects
        URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| AuthError::MalformedToken(format!("signature is not base64url: {}", e)))?;

        let algorithm = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| !is_symmetric(*alg) && self.allowed_algorithms.contains(alg))
            .ok_or_else(|| AuthError::UnsupportedAlgorithm(header.alg.clone()))?;

        Ok(UnverifiedToken {
            raw: token,
            algorithm,
            kid: header.kid,
            claims,
        })
    }

    /// Step 4: signature over header and payload
    ///
    /// A key whose JWK declares `alg` only verifies tokens using that
    /// algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSignature`]
    pub fn verify_signature(&self, token: &UnverifiedToken<'_>, key: &SigningKey) -> Result<(), AuthError> {
        if let Some(bound) = key.algorithm()
            && bound != token.algorithm
        {
            return Err(AuthError::InvalidSignature(format!(
                "key {} is bound to {:?}, token uses {:?}",
                key.kid(),
                bound,
                token.algorithm
            )));
        }

        let mut validation = Validation::new(token.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<serde_json::Value>(token.raw, key.decoding_key(), &validation)
            .map(|_| ())
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => {
                    AuthError::InvalidSignature("signature mismatch".to_string())
                }
                _ => AuthError::InvalidSignature(e.to_string()),
            })
    }

    /// Steps 5 to 8 over claims whose signature has been verified
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::IssuerMismatch`], [`AuthError::TokenExpired`],
    /// [`AuthError::TokenNotYetValid`] or [`AuthError::AudienceMismatch`]
    pub fn check_claims(
        &self,
        claims: &DecodedClaims,
        metadata: &IssuerMetadata,
        now: i64,
    ) -> Result<(), AuthError> {
        if claims.iss != metadata.issuer {
            return Err(AuthError::IssuerMismatch {
                expected: metadata.issuer.clone(),
                actual: claims.iss.clone(),
            });
        }

        let leeway = i64::try_from(self.leeway).unwrap_or(i64::MAX);

        // Without leeway a token is dead at exp; with leeway it survives
        // until exp + leeway has passed
        let expired = if leeway == 0 {
            claims.exp <= now
        } else {
            claims.exp.saturating_add(leeway) < now
        };
        if expired {
            return Err(AuthError::TokenExpired { exp: claims.exp });
        }

        let horizon = now.saturating_add(leeway);
        if claims.iat > horizon {
            return Err(AuthError::TokenNotYetValid(format!(
                "issued in the future (iat {})",
                claims.iat
            )));
        }
        if let Some(nbf) = claims.nbf
            && nbf > horizon
        {
            return Err(AuthError::TokenNotYetValid(format!(
                "not valid before {}",
                nbf
            )));
        }

        if let Some(expected) = &self.expected_audience
            && !claims.aud.as_ref().is_some_and(|aud| aud.contains(expected))
        {
            return Err(AuthError::AudienceMismatch {
                expected: expected.clone(),
            });
        }

        Ok(())
    }

    /// Run every check against a fixed key set snapshot
    ///
    /// No I/O: an unknown `kid` fails immediately instead of refreshing.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing check
    pub fn verify_with_keys(
        &self,
        token: &str,
        metadata: &IssuerMetadata,
        keys: &SigningKeySet,
        now: i64,
    ) -> Result<DecodedClaims, AuthError> {
        let token = self.inspect(token)?;
        let kid = token.kid()?;
        let key = keys.get(kid).ok_or_else(|| AuthError::UnknownKey {
            kid: kid.to_string(),
        })?;
        self.finish(token, key, metadata, now)
    }

    fn finish(
        &self,
        token: UnverifiedToken<'_>,
        key: &SigningKey,
        metadata: &IssuerMetadata,
        now: i64,
    ) -> Result<DecodedClaims, AuthError> {
        self.verify_signature(&token, key)?;
        self.check_claims(&token.claims, metadata, now)?;

        let mut claims = token.claims;
        claims.kid = token.kid;
        Ok(claims)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    name: &str,
) -> Result<T, AuthError> {
    if segment.is_empty() {
        return Err(AuthError::MalformedToken(format!("empty {}", name)));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("{} is not base64url: {}", name, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("{} is not valid JSON: {}", name, e)))
}

fn is_symmetric(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Verifies bearer tokens against the discovered issuer and cached keys
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    policy: VerificationPolicy,
    keys: KeySetCache,
}

impl TokenVerifier {
    /// Create a verifier
    pub fn new(policy: VerificationPolicy, keys: KeySetCache) -> Self {
        Self { policy, keys }
    }

    /// The decision policy
    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// The key cache consulted in step 3
    pub fn key_cache(&self) -> &KeySetCache {
        &self.keys
    }

    /// Verify `token` at the current time
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing check, or
    /// [`AuthError::KeySetUnavailable`] if no key set has been loaded
    pub async fn verify(&self, token: &str, metadata: &IssuerMetadata) -> Result<DecodedClaims, AuthError> {
        self.verify_at(token, metadata, unix_now()).await
    }

    /// Verify `token` as of `now`
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify`]
    pub async fn verify_at(
        &self,
        token: &str,
        metadata: &IssuerMetadata,
        now: i64,
    ) -> Result<DecodedClaims, AuthError> {
        let token = self.policy.inspect(token)?;
        let kid = token.kid()?.to_string();
        let key = self.keys.get_key(&kid).await?;
        let claims = self.policy.finish(token, &key, metadata, now)?;

        debug!(
            kid = %kid,
            issuer = %claims.iss,
            subject = %claims.sub,
            "Token verified"
        );

        Ok(claims)
    }
}
