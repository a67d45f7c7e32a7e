//! Kube-DC entries in the shared kubeconfig document
//!
//! Login writes one cluster, one exec-plugin user and one context per
//! granted namespace; logout removes them again. Only entries following the
//! `kube-dc` naming convention are ever rewritten. Everything else in the
//! file, including fields this crate does not model, round-trips untouched.
//!
//! Naming (see [`naming`]):
//! - cluster `kube-dc-{domain}-{org}`
//! - user `kube-dc@{domain}/{org}`
//! - context `kube-dc/{domain}/{org}/{project}`

pub mod document;
pub mod error;
pub mod manager;
pub mod naming;
pub mod sync;

pub use document::{Cluster, Context, ExecConfig, Kubeconfig, NamedCluster, NamedContext, NamedUser, User};
pub use error::{Error, Result};
pub use manager::Manager;
pub use naming::{ContextNames, full_context_name, parse_context_name, project_name};
pub use sync::{AddContextParams, ContextSync, LoginContexts, SyncedContexts, sync_login_contexts};
