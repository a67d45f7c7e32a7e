//! Credential provider for the exec-credential plugin
//!
//! Hot path: load the record and hand back its access token while it is
//! still valid. Only a stale access token triggers a refresh, and only a
//! valid refresh token is worth sending. A refresh rejected by Keycloak ends
//! the session regardless of the locally computed expiry.

use chrono::{DateTime, Utc};
use kube_dc_auth::{CredentialRecord, CredentialStore, domain_from_server, parse_unverified};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::exec::ExecCredential;
use crate::refresh::{HttpRefresher, Refresher};

/// Resolves a bearer token for an API server from the credential cache.
pub struct CredentialProvider<R = HttpRefresher> {
    store: CredentialStore,
    refresher: R,
}

impl CredentialProvider<HttpRefresher> {
    pub fn new(store: CredentialStore) -> Self {
        Self::with_refresher(store, HttpRefresher)
    }
}

impl<R: Refresher> CredentialProvider<R> {
    pub fn with_refresher(store: CredentialStore, refresher: R) -> Self {
        Self { store, refresher }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return a currently-valid token for `server`, refreshing at most once.
    pub async fn get_credential(&self, server: &str) -> Result<ExecCredential> {
        self.get_credential_at(server, Utc::now()).await
    }

    async fn get_credential_at(&self, server: &str, now: DateTime<Utc>) -> Result<ExecCredential> {
        let mut record = match self.store.load(server).await {
            Ok(record) => record,
            Err(e) => {
                debug!(server, error = %e, "no usable cached credentials");
                return Err(Error::NotLoggedIn {
                    domain: domain_from_server(server),
                });
            }
        };

        if record.is_access_token_valid_at(now) {
            debug!(server, "cached access token still valid");
            return Ok(ExecCredential::new(
                record.access_token,
                record.access_token_expiry,
            ));
        }

        if record.refresh_token.is_empty() {
            return Err(session_expired(&record, "no refresh token"));
        }
        if !record.is_refresh_token_valid_at(now) {
            return Err(session_expired(&record, "refresh token expired"));
        }

        let tokens = match self.refresher.refresh(&record).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(server, error = %e, "token refresh rejected");
                return Err(session_expired(&record, &format!("refresh failed: {e}")));
            }
        };

        let claims = parse_unverified(&tokens.access_token).map_err(Error::Token)?;
        record.apply_refresh(tokens, &claims, now);

        if let Err(e) = self.store.save(&mut record).await {
            warn!(server, error = %e, "failed to cache refreshed credentials");
        }
        info!(server, expires = %record.access_token_expiry, "access token refreshed");

        Ok(ExecCredential::new(
            record.access_token,
            record.access_token_expiry,
        ))
    }
}

fn session_expired(record: &CredentialRecord, reason: &str) -> Error {
    Error::SessionExpired {
        reason: reason.to_string(),
        domain: domain_from_server(&record.server),
        org: record.realm.clone(),
    }
}
