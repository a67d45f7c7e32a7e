//! Kube-DC OAuth authentication library
//!
//! Browser login against a Keycloak realm with PKCE, token exchange and
//! refresh, unverified claims decoding, and the on-disk credential cache.
//! Nothing here touches kubeconfig files or the terminal beyond the login
//! prompts, so the exec-credential plugin and the CLI can share it.
//!
//! Login flow:
//! 1. `callback::LoopbackLogin::login()` binds a loopback listener and opens
//!    the browser at the URL from `pkce::build_authorization_url()`
//! 2. Keycloak redirects to `/callback`; the handler verifies `state` and
//!    exchanges the code via `token::TokenClient::exchange_code()`
//! 3. The caller builds a `credentials::CredentialRecord::from_login()` and
//!    persists it with `credentials::CredentialStore::save()`
//! 4. Later invocations reload the record and call
//!    `token::TokenClient::refresh()` once the access token is stale

pub mod callback;
pub mod claims;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod pkce;
pub mod token;

pub use callback::{BrowserOpener, LoginConfig, LoopbackLogin, SystemBrowser};
pub use claims::{Claims, parse_unverified};
pub use constants::*;
pub use credentials::{CredentialRecord, CredentialStore, LoginTarget, UserInfo};
pub use error::{Error, Result};
pub use pkce::{PkceSession, build_authorization_url, compute_challenge, generate_verifier};
pub use token::{TlsOptions, TokenClient, TokenSet};
