//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier, its S256 challenge and the anti-CSRF state
//! for a single login attempt. The verifier never leaves this process until
//! the token exchange; the challenge and state travel in the authorization
//! URL, and Keycloak echoes the state back to the loopback callback.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::constants::{SCOPE, authorization_endpoint};
use crate::error::{Error, Result};

/// Random bytes behind a code verifier (43 base64url characters)
const VERIFIER_BYTES: usize = 32;

/// Random bytes behind a state value (22 base64url characters)
const STATE_BYTES: usize = 16;

/// Verifier, challenge and state for one login attempt.
///
/// Generated fresh by [`PkceSession::generate`]; never reused.
#[derive(Debug)]
pub struct PkceSession {
    pub verifier: Secret<String>,
    pub challenge: String,
    pub state: Secret<String>,
}

impl PkceSession {
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier: Secret::new(verifier),
            challenge,
            state: Secret::new(generate_state()),
        }
    }
}

/// Generate a cryptographically random PKCE code verifier.
pub fn generate_verifier() -> String {
    random_token::<VERIFIER_BYTES>()
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate an anti-CSRF state value, independent of the verifier.
pub fn generate_state() -> String {
    random_token::<STATE_BYTES>()
}

fn random_token<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Parameters of a realm authorization request.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    pub issuer: &'a str,
    pub realm: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub challenge: &'a str,
}

/// Build the Keycloak authorization URL with all PKCE parameters encoded.
pub fn build_authorization_url(req: AuthorizationRequest<'_>) -> Result<String> {
    let endpoint = authorization_endpoint(req.issuer, req.realm);
    let mut url = url::Url::parse(&endpoint)
        .map_err(|e| Error::Validation(format!("invalid identity provider URL {endpoint}: {e}")))?;

    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", req.client_id)
        .append_pair("redirect_uri", req.redirect_uri)
        .append_pair("scope", SCOPE)
        .append_pair("state", req.state)
        .append_pair("code_challenge", req.challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(url.into())
}
