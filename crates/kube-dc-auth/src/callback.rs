//! Browser login through a loopback redirect
//!
//! One login attempt:
//! 1. Bind `127.0.0.1:0` and derive the redirect URI from the OS-assigned port
//! 2. Serve `GET /callback` on a background task
//! 3. Open the browser at the realm authorization URL (print it on failure)
//! 4. Wait for the first of: callback result, caller cancellation, timeout
//!
//! The callback handler claims a single-use result slot before doing any
//! work, so the authorization code is exchanged at most once and the waiting
//! side is resolved exactly once. The listener shuts down in every outcome:
//! a drop guard fires the shutdown token when [`LoopbackLogin::login`]
//! returns or is dropped, and the server closes after [`SHUTDOWN_GRACE`] so
//! the final response reaches the browser.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{CALLBACK_PATH, LOGIN_TIMEOUT, LOOPBACK_BIND, SHUTDOWN_GRACE};
use crate::error::{Error, Result};
use crate::pkce::{AuthorizationRequest, PkceSession, build_authorization_url};
use crate::token::{TlsOptions, TokenClient, TokenSet};

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Kube-DC Login Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
<h1>&#10003; Authentication Successful</h1>
<p>You can close this window and return to your terminal.</p>
<script>setTimeout(function() { window.close(); }, 3000);</script>
</body>
</html>"#;

/// Launches the user's browser at the authorization URL.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// The platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

impl<F> BrowserOpener for F
where
    F: Fn(&str) -> std::io::Result<()> + Send + Sync,
{
    fn open(&self, url: &str) -> std::io::Result<()> {
        self(url)
    }
}

/// Identity provider coordinates for a login.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub keycloak_url: String,
    pub realm: String,
    pub client_id: String,
    pub tls: TlsOptions,
}

/// PKCE material and redirect URI for one login attempt.
#[derive(Debug)]
struct OAuthSession {
    pkce: PkceSession,
    redirect_uri: String,
}

/// Single-use hand-off from the callback handler to the waiting login.
type ResultSlot = Arc<Mutex<Option<oneshot::Sender<Result<TokenSet>>>>>;

#[derive(Clone)]
struct CallbackState {
    session: Arc<OAuthSession>,
    tokens: TokenClient,
    slot: ResultSlot,
}

/// Query parameters Keycloak appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn build_callback_router(state: CallbackState) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(state)
}

async fn handle_callback(
    State(cb): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(tx) = cb.slot.lock().await.take() else {
        debug!("callback received after login already resolved");
        return (StatusCode::BAD_REQUEST, "Login already completed").into_response();
    };

    let (outcome, response) = validate_and_exchange(&cb, params).await;
    // The waiting side may already be gone (timeout, cancellation).
    let _ = tx.send(outcome);
    response
}

async fn validate_and_exchange(
    cb: &CallbackState,
    params: CallbackParams,
) -> (Result<TokenSet>, Response) {
    let received_state = params.state.as_deref().unwrap_or_default();
    if !cb.session.pkce.state.matches(received_state) {
        warn!("login callback state does not match this session");
        return (
            Err(Error::StateMismatch),
            (StatusCode::BAD_REQUEST, "State mismatch").into_response(),
        );
    }

    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        let description = params.error_description.unwrap_or_default();
        let body = format!("Authentication error: {description}");
        return (
            Err(Error::ProviderRejected { error, description }),
            (StatusCode::BAD_REQUEST, body).into_response(),
        );
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (
            Err(Error::MissingCode),
            (StatusCode::BAD_REQUEST, "No authorization code").into_response(),
        );
    };

    let exchanged = cb
        .tokens
        .exchange_code(
            &code,
            cb.session.pkce.verifier.expose(),
            &cb.session.redirect_uri,
        )
        .await;

    match exchanged {
        Ok(tokens) => {
            info!("authorization code exchanged");
            (Ok(tokens), Html(SUCCESS_PAGE).into_response())
        }
        Err(e) => {
            warn!(error = %e, "authorization code exchange failed");
            (
                Err(e),
                (StatusCode::INTERNAL_SERVER_ERROR, "Token exchange failed").into_response(),
            )
        }
    }
}

/// Serve the callback router until `shutdown` fires, plus the grace delay.
fn spawn_listener(
    listener: TcpListener,
    router: Router,
    slot: ResultSlot,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let graceful = async move {
            shutdown.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        };

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await
        {
            warn!(error = %e, "callback server failed");
            if let Some(tx) = slot.lock().await.take() {
                let _ = tx.send(Err(Error::Io(format!("callback server error: {e}"))));
            }
        }
        debug!("callback listener stopped");
    });
}

/// Interactive browser login against a Keycloak realm.
pub struct LoopbackLogin {
    config: LoginConfig,
    opener: Box<dyn BrowserOpener>,
    timeout: Duration,
}

impl LoopbackLogin {
    pub fn new(config: LoginConfig) -> Self {
        Self {
            config,
            opener: Box::new(SystemBrowser),
            timeout: LOGIN_TIMEOUT,
        }
    }

    pub fn with_opener(mut self, opener: impl BrowserOpener + 'static) -> Self {
        self.opener = Box::new(opener);
        self
    }

    /// Shorten the wait. Never extends it past [`LOGIN_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(LOGIN_TIMEOUT);
        self
    }

    /// Run one login attempt and return the exchanged tokens.
    ///
    /// Resolves on the first of: a callback outcome, `cancel` firing, or the
    /// timeout. The listener is torn down in every case.
    pub async fn login(&self, cancel: &CancellationToken) -> Result<TokenSet> {
        let tokens = TokenClient::new(
            &self.config.keycloak_url,
            &self.config.realm,
            &self.config.client_id,
            &self.config.tls,
        )?;

        let listener = TcpListener::bind(LOOPBACK_BIND)
            .await
            .map_err(|e| Error::Io(format!("failed to start callback server: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Io(format!("failed to read callback server address: {e}")))?
            .port();

        let session = Arc::new(OAuthSession {
            pkce: PkceSession::generate(),
            redirect_uri: format!("http://localhost:{port}{CALLBACK_PATH}"),
        });

        let authorization_url = build_authorization_url(AuthorizationRequest {
            issuer: &self.config.keycloak_url,
            realm: &self.config.realm,
            client_id: &self.config.client_id,
            redirect_uri: &session.redirect_uri,
            state: session.pkce.state.expose(),
            challenge: &session.pkce.challenge,
        })?;

        let (tx, rx) = oneshot::channel();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(tx)));
        let shutdown = CancellationToken::new();
        let _teardown = shutdown.clone().drop_guard();

        let router = build_callback_router(CallbackState {
            session: session.clone(),
            tokens,
            slot: slot.clone(),
        });
        spawn_listener(listener, router, slot, shutdown);
        info!(port, realm = %self.config.realm, "login callback listener started");

        eprintln!("Opening browser for authentication...");
        eprintln!("If browser doesn't open, visit: {authorization_url}\n");
        if let Err(e) = self.opener.open(&authorization_url) {
            warn!(error = %e, "failed to open browser");
            eprintln!("Failed to open browser: {e}");
            eprintln!("Please open this URL manually: {authorization_url}");
        }
        eprintln!("Waiting for authentication...");

        tokio::select! {
            outcome = rx => outcome.unwrap_or_else(|_| {
                Err(Error::Io("callback listener stopped before login completed".into()))
            }),
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(self.timeout) => Err(Error::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::compute_challenge;
    use crate::token::tests::fake_token_endpoint;
    use axum::body::Body;
    use axum::extract::Form;
    use axum::http::Request;
    use axum::routing::post;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const TOKENS: &str = r#"{"access_token":"at","refresh_token":"rt","expires_in":300,"refresh_expires_in":1800}"#;

    /// Keycloak stand-in that enforces PKCE: the exchange only succeeds when
    /// SHA256(code_verifier) equals the challenge the browser was sent.
    #[derive(Clone, Default)]
    struct FakeKeycloak {
        challenge: Arc<std::sync::Mutex<Option<String>>>,
        redirect_uri: Arc<std::sync::Mutex<Option<String>>>,
        exchanges: Arc<AtomicUsize>,
    }

    async fn start_fake_keycloak() -> (String, FakeKeycloak) {
        let idp = FakeKeycloak::default();
        let app = Router::new()
            .route(
                "/realms/{realm}/protocol/openid-connect/token",
                post(
                    |State(idp): State<FakeKeycloak>,
                     Form(form): Form<HashMap<String, String>>| async move {
                        idp.exchanges.fetch_add(1, Ordering::SeqCst);
                        let expected = idp.challenge.lock().unwrap().clone();
                        let presented = form.get("code_verifier").map(|v| compute_challenge(v));
                        let redirect_ok =
                            idp.redirect_uri.lock().unwrap().as_ref() == form.get("redirect_uri");
                        if form.get("code").map(String::as_str) == Some("good-code")
                            && expected.is_some()
                            && expected == presented
                            && redirect_ok
                        {
                            (StatusCode::OK, TOKENS)
                        } else {
                            (
                                StatusCode::BAD_REQUEST,
                                r#"{"error":"invalid_grant","error_description":"PKCE verification failed"}"#,
                            )
                        }
                    },
                ),
            )
            .with_state(idp.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), idp)
    }

    fn login_config(issuer: &str) -> LoginConfig {
        LoginConfig {
            keycloak_url: issuer.into(),
            realm: "shalb".into(),
            client_id: "kube-dc".into(),
            tls: TlsOptions::default(),
        }
    }

    struct AuthorizationParams {
        redirect_uri: String,
        state: String,
        challenge: String,
    }

    fn parse_authorization_url(url: &str) -> AuthorizationParams {
        let parsed = url::Url::parse(url).unwrap();
        let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        AuthorizationParams {
            redirect_uri: params["redirect_uri"].clone(),
            state: params["state"].clone(),
            challenge: params["code_challenge"].clone(),
        }
    }

    /// Simulated browser: records what Keycloak would remember about the
    /// authorization request, then follows the redirect with `query`.
    fn browser(
        idp: FakeKeycloak,
        query: impl Fn(&AuthorizationParams) -> String + Send + Sync + 'static,
        status: Arc<std::sync::Mutex<Option<u16>>>,
    ) -> impl BrowserOpener + 'static {
        move |url: &str| -> std::io::Result<()> {
            let params = parse_authorization_url(url);
            *idp.challenge.lock().unwrap() = Some(params.challenge.clone());
            *idp.redirect_uri.lock().unwrap() = Some(params.redirect_uri.clone());
            let target = format!("{}?{}", params.redirect_uri, query(&params));
            let status = status.clone();
            tokio::spawn(async move {
                let response = reqwest::get(target).await.unwrap();
                *status.lock().unwrap() = Some(response.status().as_u16());
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn login_exchanges_code_with_matching_verifier() {
        let (issuer, idp) = start_fake_keycloak().await;
        let status = Arc::default();
        let opener = browser(
            idp.clone(),
            |p| format!("code=good-code&state={}", p.state),
            Arc::clone(&status),
        );

        let tokens = LoopbackLogin::new(login_config(&issuer))
            .with_opener(opener)
            .with_timeout(Duration::from_secs(10))
            .login(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token, "rt");
        assert_eq!(idp.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exchange_fails_when_challenge_does_not_match_verifier() {
        let (issuer, idp) = start_fake_keycloak().await;
        let status: Arc<std::sync::Mutex<Option<u16>>> = Arc::default();
        let inner = browser(
            idp.clone(),
            |p| format!("code=good-code&state={}", p.state),
            Arc::clone(&status),
        );
        // Keycloak remembers a challenge from some other session
        let tampered_idp = idp.clone();
        let opener = move |url: &str| -> std::io::Result<()> {
            inner.open(url)?;
            *tampered_idp.challenge.lock().unwrap() = Some(compute_challenge("other-verifier"));
            Ok(())
        };

        let result = LoopbackLogin::new(login_config(&issuer))
            .with_opener(opener)
            .with_timeout(Duration::from_secs(10))
            .login(&CancellationToken::new())
            .await;

        match result {
            Err(Error::TokenEndpoint { status, body, .. }) => {
                assert_eq!(status, 400);
                assert!(body.contains("PKCE verification failed"), "body: {body}");
            }
            other => panic!("expected TokenEndpoint error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_state_is_rejected() {
        let (issuer, idp) = start_fake_keycloak().await;
        let status: Arc<std::sync::Mutex<Option<u16>>> = Arc::default();
        let opener = browser(
            idp.clone(),
            |_| format!("code=good-code&state={}", crate::pkce::generate_state()),
            Arc::clone(&status),
        );

        let result = LoopbackLogin::new(login_config(&issuer))
            .with_opener(opener)
            .with_timeout(Duration::from_secs(10))
            .login(&CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::StateMismatch)), "got {result:?}");
        assert_eq!(idp.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_denial_is_surfaced_with_description() {
        let (issuer, idp) = start_fake_keycloak().await;
        let status: Arc<std::sync::Mutex<Option<u16>>> = Arc::default();
        let opener = browser(
            idp.clone(),
            |p| {
                format!(
                    "error=access_denied&error_description=User%20denied%20consent&state={}",
                    p.state
                )
            },
            Arc::clone(&status),
        );

        let result = LoopbackLogin::new(login_config(&issuer))
            .with_opener(opener)
            .with_timeout(Duration::from_secs(10))
            .login(&CancellationToken::new())
            .await;

        match result {
            Err(Error::ProviderRejected { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description, "User denied consent");
            }
            other => panic!("expected ProviderRejected, got {other:?}"),
        }
        assert_eq!(idp.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn browser_failure_is_not_fatal() {
        let (issuer, idp) = start_fake_keycloak().await;
        let status: Arc<std::sync::Mutex<Option<u16>>> = Arc::default();
        let inner = browser(
            idp.clone(),
            |p| format!("code=good-code&state={}", p.state),
            Arc::clone(&status),
        );
        // The user copies the printed URL after the launch fails
        let opener = move |url: &str| -> std::io::Result<()> {
            inner.open(url)?;
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no browser"))
        };

        let tokens = LoopbackLogin::new(login_config(&issuer))
            .with_opener(opener)
            .with_timeout(Duration::from_secs(10))
            .login(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at");
    }

    #[tokio::test]
    async fn cancellation_unblocks_immediately_and_closes_listener() {
        let (issuer, _idp) = start_fake_keycloak().await;
        let port = Arc::new(std::sync::Mutex::new(None));
        let seen_port = Arc::clone(&port);
        let opener = move |url: &str| -> std::io::Result<()> {
            let redirect = parse_authorization_url(url).redirect_uri;
            *seen_port.lock().unwrap() = url::Url::parse(&redirect).unwrap().port();
            Ok(())
        };

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = LoopbackLogin::new(login_config(&issuer))
            .with_opener(opener)
            .login(&cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
        assert!(started.elapsed() < Duration::from_secs(5));

        let port = port.lock().unwrap().unwrap();
        tokio::time::sleep(SHUTDOWN_GRACE + Duration::from_millis(500)).await;
        assert!(
            tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err(),
            "callback listener must be closed after the login resolves"
        );
    }

    #[tokio::test]
    async fn times_out_without_callback() {
        let (issuer, _idp) = start_fake_keycloak().await;
        let result = LoopbackLogin::new(login_config(&issuer))
            .with_opener(|_: &str| -> std::io::Result<()> { Ok(()) })
            .with_timeout(Duration::from_millis(100))
            .login(&CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))), "got {result:?}");
    }

    #[test]
    fn timeout_never_exceeds_ceiling() {
        let login = LoopbackLogin::new(login_config("https://login.example"))
            .with_timeout(Duration::from_secs(3600));
        assert_eq!(login.timeout, LOGIN_TIMEOUT);
    }

    // Router-level tests drive the handler directly.

    async fn router_fixture(
        token_status: StatusCode,
        token_body: &'static str,
    ) -> (Router, Arc<OAuthSession>, oneshot::Receiver<Result<TokenSet>>) {
        let (issuer, _) = fake_token_endpoint(token_status, token_body).await;
        let tokens =
            TokenClient::new(&issuer, "shalb", "kube-dc", &TlsOptions::default()).unwrap();
        let session = Arc::new(OAuthSession {
            pkce: PkceSession::generate(),
            redirect_uri: "http://localhost:1/callback".into(),
        });
        let (tx, rx) = oneshot::channel();
        let router = build_callback_router(CallbackState {
            session: session.clone(),
            tokens,
            slot: Arc::new(Mutex::new(Some(tx))),
        });
        (router, session, rx)
    }

    async fn get(router: &Router, query: &str) -> (StatusCode, String) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("{CALLBACK_PATH}?{query}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn success_serves_page_and_resolves_tokens() {
        let (router, session, rx) = router_fixture(StatusCode::OK, TOKENS).await;
        let (status, body) = get(
            &router,
            &format!("code=abc&state={}", session.pkce.state.expose()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Authentication Successful"));
        assert_eq!(rx.await.unwrap().unwrap().access_token, "at");
    }

    #[tokio::test]
    async fn state_is_checked_before_provider_error() {
        let (router, _session, rx) = router_fixture(StatusCode::OK, TOKENS).await;
        let (status, _) = get(&router, "error=access_denied&state=wrong").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(matches!(rx.await.unwrap(), Err(Error::StateMismatch)));
    }

    #[tokio::test]
    async fn missing_code_is_rejected() {
        let (router, session, rx) = router_fixture(StatusCode::OK, TOKENS).await;
        let (status, _) = get(
            &router,
            &format!("code=&state={}", session.pkce.state.expose()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(matches!(rx.await.unwrap(), Err(Error::MissingCode)));
    }

    #[tokio::test]
    async fn exchange_failure_answers_500_with_raw_body_in_error() {
        const BODY: &str = r#"{"error":"invalid_grant","error_description":"Code not valid"}"#;
        let (router, session, rx) = router_fixture(StatusCode::BAD_REQUEST, BODY).await;
        let (status, _) = get(
            &router,
            &format!("code=stale&state={}", session.pkce.state.expose()),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        match rx.await.unwrap() {
            Err(Error::TokenEndpoint { body, .. }) => assert_eq!(body, BODY),
            other => panic!("expected TokenEndpoint error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_callback_does_not_exchange_again() {
        let (router, session, rx) = router_fixture(StatusCode::OK, TOKENS).await;
        let query = format!("code=abc&state={}", session.pkce.state.expose());

        let (first, _) = get(&router, &query).await;
        let (second, body) = get(&router, &query).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::BAD_REQUEST);
        assert!(body.contains("already completed"));
        assert!(rx.await.unwrap().is_ok());
    }
}
