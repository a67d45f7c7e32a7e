//! Kube-DC endpoint conventions
//!
//! Every Kube-DC installation is addressed by a single domain. The API server
//! and the Keycloak identity provider live at fixed hosts under that domain,
//! and each organization is a Keycloak realm. The public client id is not a
//! secret.

use std::time::Duration;

/// Public OAuth client registered in every organization realm
pub const DEFAULT_CLIENT_ID: &str = "kube-dc";

/// OAuth scope requested at authorization time
pub const SCOPE: &str = "openid";

/// Port the Kube-DC API server listens on
pub const API_SERVER_PORT: u16 = 6443;

/// Bind address for the loopback callback listener. Port 0 lets the OS
/// pick a free ephemeral port.
pub const LOOPBACK_BIND: &str = "127.0.0.1:0";

/// Path served by the loopback listener
pub const CALLBACK_PATH: &str = "/callback";

/// Ceiling on how long a browser login may take
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Delay before the loopback listener closes, so the last response reaches
/// the browser
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Request timeout for the token endpoint
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Clock-skew buffer applied to access-token expiry
pub const ACCESS_TOKEN_SKEW: Duration = Duration::from_secs(30);

/// Clock-skew buffer applied to refresh-token expiry
pub const REFRESH_TOKEN_SKEW: Duration = Duration::from_secs(60);

/// Validity assumed for refresh tokens the provider reports as non-expiring
/// (`refresh_expires_in <= 0`, i.e. offline tokens)
pub const OFFLINE_REFRESH_VALIDITY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// API server URL for a Kube-DC domain.
///
/// `stage.kube-dc.com` → `https://kube-api.stage.kube-dc.com:6443`
pub fn api_server_url(domain: &str) -> String {
    format!("https://kube-api.{domain}:{API_SERVER_PORT}")
}

/// Keycloak base URL for a Kube-DC domain.
///
/// `stage.kube-dc.com` → `https://login.stage.kube-dc.com`
pub fn identity_provider_url(domain: &str) -> String {
    format!("https://login.{domain}")
}

/// Realm authorization endpoint
pub fn authorization_endpoint(issuer: &str, realm: &str) -> String {
    format!(
        "{}/realms/{realm}/protocol/openid-connect/auth",
        issuer.trim_end_matches('/')
    )
}

/// Realm token endpoint, used for both the code exchange and refresh
pub fn token_endpoint(issuer: &str, realm: &str) -> String {
    format!(
        "{}/realms/{realm}/protocol/openid-connect/token",
        issuer.trim_end_matches('/')
    )
}

/// Recover the Kube-DC domain from an API server URL, for remediation hints.
///
/// Strips the scheme, port and a leading `kube-api.` label. Anything that
/// does not parse as a URL is returned unchanged.
pub fn domain_from_server(server: &str) -> String {
    let host = url::Url::parse(server)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned));

    match host {
        Some(host) => host
            .strip_prefix("kube-api.")
            .map(str::to_owned)
            .unwrap_or(host),
        None => server.to_owned(),
    }
}
