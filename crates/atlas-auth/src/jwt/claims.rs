//! Token claims
//!
//! [`DecodedClaims`] is the typed view of a token payload. `iss`, `sub`,
//! `exp` and `iat` are required; a payload without them does not
//! deserialize and the token is rejected as malformed.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// The `aud` claim, which RFC 7519 allows as a string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "api"`
    Single(String),
    /// `"aud": ["api", "admin"]`
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `audience` is this value or a member of it
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(aud) => aud == audience,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    /// All audiences as a list
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(aud) => vec![aud.clone()],
            Self::Multiple(auds) => auds.clone(),
        }
    }
}

/// Claims of a single token; lives for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedClaims {
    /// Issuer
    pub iss: String,

    /// Subject
    pub sub: String,

    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration time (seconds since the epoch)
    #[serde(deserialize_with = "numeric_date")]
    pub exp: i64,

    /// Issued at (seconds since the epoch)
    #[serde(deserialize_with = "numeric_date")]
    pub iat: i64,

    /// Not before (seconds since the epoch)
    #[serde(
        default,
        deserialize_with = "optional_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,

    /// Key id from the token header
    #[serde(skip)]
    pub kid: Option<String>,

    /// JWT ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Space-separated scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Authorized party
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// OAuth client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Provider session id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Claims not modelled above
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl DecodedClaims {
    /// Scopes from the `scope` claim
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Audiences as a list; empty when `aud` is absent
    pub fn audiences(&self) -> Vec<String> {
        self.aud.as_ref().map(Audience::to_vec).unwrap_or_default()
    }
}

/// NumericDate per RFC 7519: integer or fractional seconds
#[derive(Deserialize)]
#[serde(untagged)]
enum NumericDate {
    Integer(i64),
    Fractional(f64),
}

impl From<NumericDate> for i64 {
    fn from(value: NumericDate) -> Self {
        match value {
            NumericDate::Integer(seconds) => seconds,
            NumericDate::Fractional(seconds) => seconds.floor() as i64,
        }
    }
}

fn numeric_date<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    NumericDate::deserialize(deserializer).map(i64::from)
}

fn optional_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NumericDate>::deserialize(deserializer).map(|date| date.map(i64::from))
}
