//! Error types for authentication and credential storage

use std::time::Duration;

/// Errors from the login flow, token endpoint, claims decoding and the
/// credential store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("state mismatch in login callback")]
    StateMismatch,

    #[error("identity provider rejected login: {error} - {description}")]
    ProviderRejected { error: String, description: String },

    #[error("no authorization code received")]
    MissingCode,

    /// Non-success answer from the token endpoint. `body` is the provider's
    /// response, untouched.
    #[error("token {grant} failed ({status}): {body}")]
    TokenEndpoint {
        grant: &'static str,
        status: u16,
        body: String,
    },

    #[error("authentication timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("authentication cancelled")]
    Cancelled,

    #[error("token decode error: {0}")]
    Decode(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
