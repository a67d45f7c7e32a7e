//! Login-time and logout-time kubeconfig synchronization

use tracing::{debug, warn};

use crate::error::Result;
use crate::naming::ContextNames;

/// One cluster/user/context triple to write.
#[derive(Debug, Clone)]
pub struct AddContextParams {
    pub server: String,
    pub names: ContextNames,
    pub namespace: String,
    /// PEM trust root for the API server
    pub ca_cert: Option<String>,
    pub insecure: bool,
    pub set_current: bool,
}

/// Where login and logout write their kubeconfig entries.
pub trait ContextSync {
    fn upsert(&self, params: &AddContextParams) -> Result<()>;

    /// Remove Kube-DC entries for `server`, returning how many went away.
    fn remove_all(&self, server: &str) -> Result<usize>;
}

/// Result of a login, as far as kubeconfig is concerned.
#[derive(Debug, Clone, Copy)]
pub struct LoginContexts<'a> {
    pub server: &'a str,
    pub domain: &'a str,
    pub org: &'a str,
    pub namespaces: &'a [String],
    pub ca_cert: Option<&'a str>,
    pub insecure: bool,
}

/// Contexts written by a login sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncedContexts {
    pub written: Vec<String>,
    /// The context made current, if any upsert succeeded
    pub current: Option<String>,
}

/// Upsert one context per granted namespace. The first one written
/// successfully becomes current.
///
/// A failure for one context is logged and the rest are still written.
pub fn sync_login_contexts(sync: &dyn ContextSync, login: &LoginContexts<'_>) -> SyncedContexts {
    let mut synced = SyncedContexts {
        written: Vec::with_capacity(login.namespaces.len()),
        current: None,
    };

    for namespace in login.namespaces {
        let params = AddContextParams {
            server: login.server.to_string(),
            names: ContextNames::new(login.domain, login.org, namespace),
            namespace: namespace.clone(),
            ca_cert: login.ca_cert.map(str::to_string),
            insecure: login.insecure,
            set_current: synced.current.is_none(),
        };

        match sync.upsert(&params) {
            Ok(()) => {
                debug!(context = %params.names.context, "kubeconfig context written");
                if params.set_current {
                    synced.current = Some(params.names.context.clone());
                }
                synced.written.push(params.names.context);
            }
            Err(e) => warn!(context = %params.names.context, error = %e, "failed to add context"),
        }
    }

    synced
}
