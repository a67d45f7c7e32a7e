//! `client.authentication.k8s.io/v1` ExecCredential document

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1";
pub const EXEC_KIND: &str = "ExecCredential";

/// What kubectl reads from the plugin's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredential {
    pub api_version: String,
    pub kind: String,
    pub status: ExecCredentialStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredentialStatus {
    pub token: String,
    /// RFC3339, UTC, second precision
    pub expiration_timestamp: String,
}

impl ExecCredential {
    pub fn new(token: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            api_version: EXEC_API_VERSION.into(),
            kind: EXEC_KIND.into(),
            status: ExecCredentialStatus {
                token: token.into(),
                expiration_timestamp: expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        }
    }

    /// Single-line JSON for stdout.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Encode(e.to_string()))
    }
}
