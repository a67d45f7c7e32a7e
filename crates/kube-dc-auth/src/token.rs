//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (end of the browser login)
//! 2. Token refresh (exec-credential invocations with an expired access token)
//!
//! Both POST a form to the realm token endpoint and differ only in the grant
//! parameters, so they share [`TokenClient::request`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{TOKEN_REQUEST_TIMEOUT, token_endpoint};
use crate::error::{Error, Result};

/// Response from the token endpoint for both grant types.
///
/// `expires_in` and `refresh_expires_in` are deltas in seconds from the
/// response time. Keycloak reports `refresh_expires_in = 0` for offline
/// tokens, which do not expire on their own.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Trust settings for talking to a self-hosted identity provider.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// PEM bundle trusted instead of the system roots
    pub ca_cert: Option<String>,
    /// Skip certificate verification entirely
    pub insecure: bool,
}

/// Grant parameters for a token request.
#[derive(Debug, Clone, Copy)]
pub enum Grant<'a> {
    AuthorizationCode {
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        refresh_token: &'a str,
    },
}

impl Grant<'_> {
    fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Short operation name used in error messages
    fn operation(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "exchange",
            Grant::RefreshToken { .. } => "refresh",
        }
    }
}

/// Build the HTTP client used against the identity provider.
///
/// A supplied CA bundle replaces the system roots. An unparseable bundle is
/// logged and ignored, leaving the system roots in place.
pub fn build_http_client(tls: &TlsOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(TOKEN_REQUEST_TIMEOUT);

    if let Some(certs) = custom_roots(tls) {
        debug!(count = certs.len(), "trusting only the supplied CA certificates");
        builder = builder.tls_certs_only(certs);
    }

    if tls.insecure {
        warn!("TLS certificate verification disabled for identity provider");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| Error::Http(format!("building HTTP client: {e}")))
}

/// Certificates of the supplied CA bundle, or `None` to keep the system roots.
fn custom_roots(tls: &TlsOptions) -> Option<Vec<reqwest::Certificate>> {
    let pem = tls.ca_cert.as_deref().filter(|p| !p.trim().is_empty())?;
    match reqwest::Certificate::from_pem_bundle(pem.as_bytes()) {
        Ok(certs) if !certs.is_empty() => Some(certs),
        Ok(_) => {
            warn!("CA certificate bundle contains no certificates, ignoring");
            None
        }
        Err(e) => {
            warn!(error = %e, "failed to parse CA certificate, ignoring");
            None
        }
    }
}

/// Client for one realm's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
}

impl TokenClient {
    pub fn new(issuer: &str, realm: &str, client_id: &str, tls: &TlsOptions) -> Result<Self> {
        Ok(Self::with_http_client(
            build_http_client(tls)?,
            issuer,
            realm,
            client_id,
        ))
    }

    pub fn with_http_client(
        http: reqwest::Client,
        issuer: &str,
        realm: &str,
        client_id: &str,
    ) -> Self {
        Self {
            http,
            endpoint: token_endpoint(issuer, realm),
            client_id: client_id.to_owned(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST a grant to the token endpoint.
    ///
    /// Any non-success status yields [`Error::TokenEndpoint`] carrying the
    /// response body verbatim.
    pub async fn request(&self, grant: Grant<'_>) -> Result<TokenSet> {
        let mut form = vec![
            ("grant_type", grant.grant_type()),
            ("client_id", self.client_id.as_str()),
        ];
        match grant {
            Grant::AuthorizationCode {
                code,
                verifier,
                redirect_uri,
            } => {
                form.push(("code", code));
                form.push(("redirect_uri", redirect_uri));
                form.push(("code_verifier", verifier));
            }
            Grant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token));
            }
        }

        debug!(endpoint = %self.endpoint, grant_type = grant.grant_type(), "requesting token");

        let response = self
            .http
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("token {} request failed: {e}", grant.operation())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading token {} response: {e}", grant.operation())))?;

        if !status.is_success() {
            return Err(Error::TokenEndpoint {
                grant: grant.operation(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::Decode(format!("invalid token {} response: {e}", grant.operation()))
        })
    }

    /// Exchange an authorization code, proving possession of the verifier.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet> {
        self.request(Grant::AuthorizationCode {
            code,
            verifier,
            redirect_uri,
        })
        .await
    }

    /// Redeem a refresh token for a new token set.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        self.request(Grant::RefreshToken { refresh_token }).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Form, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    pub(crate) type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

    /// Fake Keycloak token endpoint. Records every form it receives and
    /// answers with `status` and `body`.
    pub(crate) async fn fake_token_endpoint(
        status: StatusCode,
        body: &'static str,
    ) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/realms/{realm}/protocol/openid-connect/token",
                post(
                    move |State(captured): State<Captured>,
                          Form(form): Form<HashMap<String, String>>| async move {
                        captured.lock().unwrap().push(form);
                        (status, body)
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    const KEYCLOAK_RESPONSE: &str = r#"{
        "access_token": "at_new",
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "refresh_token": "rt_new",
        "token_type": "Bearer",
        "id_token": "id_new",
        "not-before-policy": 0,
        "session_state": "5c1f",
        "scope": "openid email profile"
    }"#;

    #[test]
    fn token_set_deserializes_keycloak_response() {
        let tokens: TokenSet = serde_json::from_str(KEYCLOAK_RESPONSE).unwrap();
        assert_eq!(tokens.access_token, "at_new");
        assert_eq!(tokens.refresh_token, "rt_new");
        assert_eq!(tokens.id_token.as_deref(), Some("id_new"));
        assert_eq!(tokens.expires_in, 300);
        assert_eq!(tokens.refresh_expires_in, 1800);
    }

    #[test]
    fn token_set_tolerates_missing_optional_fields() {
        let tokens: TokenSet =
            serde_json::from_str(r#"{"access_token":"at","refresh_expires_in":0}"#).unwrap();
        assert_eq!(tokens.refresh_token, "");
        assert!(tokens.id_token.is_none());
        assert_eq!(tokens.refresh_expires_in, 0);
    }

    #[tokio::test]
    async fn exchange_posts_pkce_form() {
        let (issuer, captured) = fake_token_endpoint(StatusCode::OK, KEYCLOAK_RESPONSE).await;
        let client = TokenClient::new(&issuer, "shalb", "kube-dc", &TlsOptions::default()).unwrap();

        let tokens = client
            .exchange_code("code-1", "verifier-1", "http://localhost:5000/callback")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at_new");

        let forms = captured.lock().unwrap();
        assert_eq!(forms.len(), 1);
        let form = &forms[0];
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["client_id"], "kube-dc");
        assert_eq!(form["code"], "code-1");
        assert_eq!(form["code_verifier"], "verifier-1");
        assert_eq!(form["redirect_uri"], "http://localhost:5000/callback");
    }

    #[tokio::test]
    async fn refresh_posts_refresh_grant_only() {
        let (issuer, captured) = fake_token_endpoint(StatusCode::OK, KEYCLOAK_RESPONSE).await;
        let client = TokenClient::new(&issuer, "shalb", "kube-dc", &TlsOptions::default()).unwrap();

        client.refresh("rt_old").await.unwrap();

        let forms = captured.lock().unwrap();
        let form = &forms[0];
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "rt_old");
        assert_eq!(form["client_id"], "kube-dc");
        assert!(!form.contains_key("code_verifier"));
        assert_eq!(form.len(), 3);
    }

    #[tokio::test]
    async fn non_success_status_returns_raw_body() {
        const BODY: &str =
            r#"{"error":"invalid_grant","error_description":"Token is not active"}"#;
        let (issuer, _) = fake_token_endpoint(StatusCode::BAD_REQUEST, BODY).await;
        let client = TokenClient::new(&issuer, "shalb", "kube-dc", &TlsOptions::default()).unwrap();

        match client.refresh("rt_revoked").await {
            Err(Error::TokenEndpoint {
                grant,
                status,
                body,
            }) => {
                assert_eq!(grant, "refresh");
                assert_eq!(status, 400);
                assert_eq!(body, BODY);
            }
            other => panic!("expected TokenEndpoint error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_error() {
        let (issuer, _) = fake_token_endpoint(StatusCode::OK, "<html>proxy</html>").await;
        let client = TokenClient::new(&issuer, "shalb", "kube-dc", &TlsOptions::default()).unwrap();

        let result = client.refresh("rt").await;
        assert!(matches!(result, Err(Error::Decode(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_http_error() {
        // Bind and immediately drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TokenClient::new(
            &format!("http://{addr}"),
            "shalb",
            "kube-dc",
            &TlsOptions::default(),
        )
        .unwrap();
        let result = client.refresh("rt").await;
        assert!(matches!(result, Err(Error::Http(_))), "got {result:?}");
    }

    /// Self-signed P-256 CA, valid until 2126
    const TEST_CA_PEM: &str = "\
-----BEGIN CERTIFICATE-----
MIIBijCCATGgAwIBAgIUajI2S5XrFPNuEpIPXArxK/CHjYkwCgYIKoZIzj0EAwIw
GjEYMBYGA1UEAwwPa3ViZS1kYyB0ZXN0IENBMCAXDTI2MTAxNjEwMDIzN1oYDzIx
MjYwOTIyMTAwMjM3WjAaMRgwFgYDVQQDDA9rdWJlLWRjIHRlc3QgQ0EwWTATBgcq
hkjOPQIBBggqhkjOPQMBBwNCAARKMhdknehaUcY0VGQzfaq/ixtCYdMgQZiHKJXt
FQKRVLWpekCBb0vqBTCH9/6eREcGdz+oLmhA9jduAqDzHzLJo1MwUTAdBgNVHQ4E
FgQUOvl56HW8P2pX4trOP2tkwi5JGNowHwYDVR0jBBgwFoAUOvl56HW8P2pX4trO
P2tkwi5JGNowDwYDVR0TAQH/BAUwAwEB/zAKBggqhkjOPQQDAgNHADBEAiB6Lj0f
iz9ANIbKCfG+xuWmqW0A8iMnc5/0KdgaqZrQkwIgQW0YJdqm9i9842/mG3c3C4Y3
fpO3B4Nq/hH7w8cNBKg=
-----END CERTIFICATE-----
";

    #[test]
    fn garbage_ca_cert_is_ignored() {
        let tls = TlsOptions {
            ca_cert: Some("not a certificate".into()),
            insecure: false,
        };
        assert!(custom_roots(&tls).is_none());
        assert!(build_http_client(&tls).is_ok());
    }

    #[test]
    fn supplied_ca_becomes_the_only_trust_root() {
        let tls = TlsOptions {
            ca_cert: Some(TEST_CA_PEM.into()),
            insecure: false,
        };
        assert_eq!(custom_roots(&tls).map(|certs| certs.len()), Some(1));
        assert!(build_http_client(&tls).is_ok());

        // No bundle keeps the system roots
        assert!(custom_roots(&TlsOptions::default()).is_none());
        let blank = TlsOptions {
            ca_cert: Some("  \n".into()),
            insecure: false,
        };
        assert!(custom_roots(&blank).is_none());
    }

    #[test]
    fn insecure_client_builds() {
        let tls = TlsOptions {
            ca_cert: None,
            insecure: true,
        };
        assert!(build_http_client(&tls).is_ok());
    }

    #[test]
    fn endpoint_targets_realm() {
        let client = TokenClient::with_http_client(
            reqwest::Client::new(),
            "https://login.stage.kube-dc.com",
            "shalb",
            "kube-dc",
        );
        assert_eq!(
            client.endpoint(),
            "https://login.stage.kube-dc.com/realms/shalb/protocol/openid-connect/token"
        );
    }
}
