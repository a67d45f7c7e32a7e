//! Error types for credential provisioning

/// Errors returned to the exec-credential caller.
///
/// Every variant a user can fix by logging in carries the login command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not logged in. Run: kube-dc login --domain {domain} --org <your-org>")]
    NotLoggedIn { domain: String },

    #[error("session expired ({reason}). Run: kube-dc login --domain {domain} --org {org}")]
    SessionExpired {
        reason: String,
        domain: String,
        org: String,
    },

    #[error("failed to parse refreshed token: {0}")]
    Token(#[source] kube_dc_auth::Error),

    #[error("failed to encode exec credential: {0}")]
    Encode(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
