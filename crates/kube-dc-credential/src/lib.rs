//! Exec-credential plugin core for Kube-DC
//!
//! Turns a cached credential record into a currently-valid bearer token for
//! kubectl. The record for a server is loaded from the `CredentialStore`;
//! a still-valid access token is returned without touching the network,
//! otherwise the refresh token is exchanged once and the result cached.
//!
//! Invocation lifecycle:
//! 1. kubectl runs `kube-dc credential --server <url>`
//! 2. `CredentialProvider::get_credential()` loads the record
//! 3. Valid access token → `ExecCredential` immediately
//! 4. Stale access token + valid refresh token → `Refresher::refresh()`,
//!    record updated and saved (save failures only warn)
//! 5. Anything else → "not logged in" / "session expired" with the login
//!    command to run

pub mod error;
pub mod exec;
pub mod provider;
pub mod refresh;

pub use error::{Error, Result};
pub use exec::{EXEC_API_VERSION, EXEC_KIND, ExecCredential, ExecCredentialStatus};
pub use provider::CredentialProvider;
pub use refresh::{HttpRefresher, Refresher};
