//! Refresh-token grant seam
//!
//! The provider depends on [`Refresher`] rather than on HTTP directly so the
//! refresh decision can be tested without a token endpoint.

use std::future::Future;
use std::pin::Pin;

use kube_dc_auth::{CredentialRecord, TokenClient, TokenSet};

/// Exchanges a record's refresh token for a new token set.
///
/// Uses `Pin<Box<dyn Future>>` so providers can hold `Arc<dyn Refresher>`.
pub trait Refresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        record: &'a CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = kube_dc_auth::Result<TokenSet>> + Send + 'a>>;
}

/// Refreshes against the record's own Keycloak realm, honoring the CA and
/// insecure settings captured at login.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpRefresher;

impl Refresher for HttpRefresher {
    fn refresh<'a>(
        &'a self,
        record: &'a CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = kube_dc_auth::Result<TokenSet>> + Send + 'a>> {
        Box::pin(async move {
            let client = TokenClient::new(
                &record.keycloak_url,
                &record.realm,
                &record.client_id,
                &record.tls_options(),
            )?;
            client.refresh(&record.refresh_token).await
        })
    }
}
