//! Naming convention for Kube-DC kubeconfig entries
//!
//! Names embed the domain and organization so several installations and
//! organizations can live in one kubeconfig without colliding.

pub const CLUSTER_PREFIX: &str = "kube-dc-";
pub const USER_PREFIX: &str = "kube-dc@";
pub const CONTEXT_PREFIX: &str = "kube-dc/";

/// Command kubectl runs to obtain a token.
pub const EXEC_COMMAND: &str = "kube-dc";
pub const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1";
pub const EXEC_INTERACTIVE_MODE: &str = "IfAvailable";

/// Cluster, user and context names for one namespace of a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextNames {
    pub cluster: String,
    pub user: String,
    pub context: String,
}

impl ContextNames {
    pub fn new(domain: &str, org: &str, namespace: &str) -> Self {
        Self {
            cluster: cluster_name(domain, org),
            user: user_name(domain, org),
            context: context_name(domain, org, project_name(org, namespace)),
        }
    }
}

pub fn cluster_name(domain: &str, org: &str) -> String {
    format!("{CLUSTER_PREFIX}{domain}-{org}")
}

pub fn user_name(domain: &str, org: &str) -> String {
    format!("{USER_PREFIX}{domain}/{org}")
}

pub fn context_name(domain: &str, org: &str, project: &str) -> String {
    format!("{CONTEXT_PREFIX}{domain}/{org}/{project}")
}

/// Project part of a namespace: `shalb-dev` in org `shalb` is `dev`.
pub fn project_name<'a>(org: &str, namespace: &'a str) -> &'a str {
    namespace
        .strip_prefix(org)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(namespace)
}

/// Accept `domain/org/project` or the full `kube-dc/...` context name.
pub fn full_context_name(target: &str) -> String {
    if target.starts_with(CONTEXT_PREFIX) {
        target.to_string()
    } else {
        format!("{CONTEXT_PREFIX}{target}")
    }
}

/// Split a context name into `(domain, org, project)`.
pub fn parse_context_name(name: &str) -> Option<(&str, &str, &str)> {
    let mut parts = name.strip_prefix(CONTEXT_PREFIX)?.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(domain), Some(org), Some(project)) => Some((domain, org, project)),
        _ => None,
    }
}

pub fn is_kube_dc_cluster(name: &str) -> bool {
    name.starts_with(CLUSTER_PREFIX)
}

pub fn is_kube_dc_user(name: &str) -> bool {
    name.starts_with(USER_PREFIX)
}

pub fn is_kube_dc_context(name: &str) -> bool {
    name.starts_with(CONTEXT_PREFIX)
}
