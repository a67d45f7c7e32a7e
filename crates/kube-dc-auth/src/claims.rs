//! Unverified JWT claims extraction
//!
//! Kube-DC access tokens carry the identity attributes the CLI needs for its
//! own bookkeeping: expiry, email, organization, groups and the namespaces
//! the user may act in. This module reads them without checking the
//! signature. The API server that receives the token verifies it; nothing
//! here decides whether a token is trustworthy.

use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::general_purpose::NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// base64url that accepts payloads with or without `=` padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims of a Kube-DC access token. Read-only view; every field defaults
/// when absent.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Claims {
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(rename = "aud", deserialize_with = "string_or_list")]
    audience: Vec<String>,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "iat")]
    pub issued_at: i64,

    pub email: String,
    pub org: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub groups: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub namespaces: Vec<String>,

    pub preferred_username: String,
    pub name: String,
    pub given_name: String,
    pub family_name: String,
}

impl Claims {
    /// Audience normalized to a list, whether the token carried a single
    /// string or an array.
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// Absolute expiry of the token
    pub fn expiry(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires_at, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at
    }

    /// Time left until expiry; negative once expired.
    pub fn expires_in(&self) -> chrono::Duration {
        self.expiry() - Utc::now()
    }
}

/// Decode the payload of a compact JWT without verifying its signature.
pub fn parse_unverified(token: &str) -> Result<Claims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::Decode(format!(
            "invalid token format: expected 3 segments, got {}",
            parts.len()
        )));
    }

    let payload = URL_SAFE_LENIENT
        .decode(parts[1])
        .map_err(|e| Error::Decode(format!("failed to decode token payload: {e}")))?;

    serde_json::from_slice(&payload)
        .map_err(|e| Error::Decode(format!("failed to parse token claims: {e}")))
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<serde_json::Value>),
        Null(()),
    }

    // Non-string list entries are dropped rather than failing the decode
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        OneOrMany::Null(()) => Vec::new(),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
