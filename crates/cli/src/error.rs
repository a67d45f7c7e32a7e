//! Command-level error types
//!
//! Library errors pass through `anyhow`; these cover the checks the CLI
//! itself makes before calling into a library.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("no kube-dc contexts found. Run: kube-dc login")]
    NoContexts,

    #[error("context '{name}' not found. Available: {}", available.join(", "))]
    UnknownContext { name: String, available: Vec<String> },

    #[error("current context '{0}' is not a kube-dc context")]
    NotKubeDcContext(String),

    #[error("could not find server URL for current context")]
    NoServerForContext,

    #[error("not logged in. Run: kube-dc login --domain {domain} --org {org}")]
    NotLoggedIn { domain: String, org: String },

    #[error("no namespaces found in credentials")]
    NoNamespaces,

    #[error("namespace '{namespace}' not in your allowed namespaces: {}", allowed.join(", "))]
    NamespaceNotAllowed {
        namespace: String,
        allowed: Vec<String>,
    },
}
