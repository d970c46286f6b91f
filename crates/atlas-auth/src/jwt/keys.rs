//! Signing keys parsed from a JSON Web Key Set
//!
//! A [`SigningKeySet`] is an immutable snapshot: the cache replaces it as a
//! whole on refresh and readers hold an `Arc` to whichever snapshot they
//! loaded.

use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::error::KeySetError;

/// Public key able to verify token signatures
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    key_type: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Key id
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// JWK `kty` (`RSA`, `EC`, `OKP`)
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// Algorithm the key is bound to, if the JWK declares one
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for `jsonwebtoken`
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("key_type", &self.key_type)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

/// Keys indexed by `kid`, with the freshness window of the fetch they came from
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: SystemTime,
    ttl: Duration,
}

impl SigningKeySet {
    /// Parse a JWKS document
    ///
    /// Keys without a `kid`, with a `use` other than `sig`, symmetric keys and
    /// keys that cannot be turned into verification material are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::InvalidJson`] when the body is not a JWKS
    /// document and [`KeySetError::Empty`] when no usable key remains
    pub fn from_json(body: &[u8], fetched_at: SystemTime, ttl: Duration) -> Result<Self, KeySetError> {
        let raw: RawKeySet =
            serde_json::from_slice(body).map_err(|e| KeySetError::InvalidJson(e.to_string()))?;

        let mut keys = HashMap::with_capacity(raw.keys.len());
        for value in raw.keys {
            let Some(key) = parse_key(value) else {
                continue;
            };
            if keys.contains_key(&key.kid) {
                debug!(kid = %key.kid, "Skipping duplicate JWK");
                continue;
            }
            keys.insert(key.kid.clone(), Arc::new(key));
        }

        if keys.is_empty() {
            return Err(KeySetError::Empty);
        }

        Ok(Self {
            keys,
            fetched_at,
            ttl,
        })
    }

    /// Look up a key by id
    pub fn get(&self, kid: &str) -> Option<&Arc<SigningKey>> {
        self.keys.get(kid)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a parsed set
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids, sorted
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }

    /// When the set was fetched
    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    /// Freshness lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether the set is still within its freshness window at `now`
    pub fn is_fresh_at(&self, now: SystemTime) -> bool {
        match now.duration_since(self.fetched_at) {
            Ok(age) => age < self.ttl,
            Err(_) => false, // Clock went backwards, invalidate
        }
    }

    /// Whether the set is still within its freshness window
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(SystemTime::now())
    }
}

fn parse_key(value: serde_json::Value) -> Option<SigningKey> {
    let field = |name: &str| value.get(name).and_then(serde_json::Value::as_str);

    let Some(kid) = field("kid").filter(|kid| !kid.is_empty()).map(str::to_owned) else {
        debug!("Skipping JWK without kid");
        return None;
    };

    if let Some(key_use) = field("use")
        && key_use != "sig"
    {
        debug!(kid = %kid, key_use = %key_use, "Skipping non-signing JWK");
        return None;
    }

    let key_type = field("kty").unwrap_or_default().to_owned();
    if key_type == "oct" {
        debug!(kid = %kid, "Skipping symmetric JWK");
        return None;
    }

    let algorithm = match field("alg") {
        Some(alg) => match Algorithm::from_str(alg) {
            Ok(alg) => Some(alg),
            Err(_) => {
                debug!(kid = %kid, alg = %alg, "Skipping JWK with unsupported alg");
                return None;
            }
        },
        None => None,
    };

    let jwk: Jwk = match serde_json::from_value(value) {
        Ok(jwk) => jwk,
        Err(e) => {
            debug!(kid = %kid, error = %e, "Skipping unparsable JWK");
            return None;
        }
    };

    let decoding_key = match DecodingKey::from_jwk(&jwk) {
        Ok(key) => key,
        Err(e) => {
            debug!(kid = %kid, error = %e, "Skipping JWK with unusable key material");
            return None;
        }
    };

    Some(SigningKey {
        kid,
        key_type,
        algorithm,
        decoding_key,
    })
}
