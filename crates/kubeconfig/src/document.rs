//! kubeconfig document model and in-memory edits
//!
//! Only the fields Kube-DC reads or writes are modeled. Every other key, at
//! any level, is captured in a flattened `extra` map and written back as-is.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::naming::{
    EXEC_API_VERSION, EXEC_COMMAND, EXEC_INTERACTIVE_MODE, is_kube_dc_cluster,
    is_kube_dc_context, is_kube_dc_user,
};
use crate::sync::AddContextParams;

type Extra = BTreeMap<String, serde_yaml::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(rename = "current-context", default, deserialize_with = "null_as_default")]
    pub current_context: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clusters: Vec<NamedCluster>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contexts: Vec<NamedContext>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: Vec<NamedUser>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    #[serde(default)]
    pub cluster: Cluster,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub server: String,
    #[serde(
        rename = "certificate-authority-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
    #[serde(
        rename = "insecure-skip-tls-verify",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub insecure_skip_tls_verify: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    #[serde(default)]
    pub context: Context,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: User,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecConfig>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(rename = "interactiveMode", default, skip_serializing_if = "Option::is_none")]
    pub interactive_mode: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ExecConfig {
    /// Exec plugin entry that runs `kube-dc credential --server <server>`.
    pub fn kube_dc(server: &str) -> Self {
        Self {
            api_version: EXEC_API_VERSION.into(),
            command: EXEC_COMMAND.into(),
            args: vec!["credential".into(), "--server".into(), server.into()],
            interactive_mode: Some(EXEC_INTERACTIVE_MODE.into()),
            extra: Extra::new(),
        }
    }

    /// Value passed to `--server`, if any.
    pub fn server_arg(&self) -> Option<&str> {
        self.args
            .windows(2)
            .find(|pair| pair[0] == "--server")
            .map(|pair| pair[1].as_str())
    }
}

fn default_api_version() -> String {
    "v1".into()
}

fn default_kind() -> String {
    "Config".into()
}

/// kubectl writes `clusters: null` and friends for empty sections.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for Kubeconfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            current_context: String::new(),
            clusters: Vec::new(),
            contexts: Vec::new(),
            users: Vec::new(),
            extra: Extra::new(),
        }
    }
}

impl Kubeconfig {
    /// Parse a document. Empty input is an empty config.
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| Error::Yaml(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Yaml(e.to_string()))
    }

    /// Add or replace the cluster, user and context for one namespace.
    ///
    /// A CA certificate is embedded base64-encoded; TLS verification is
    /// skipped only when no CA is available.
    pub fn upsert(&mut self, params: &AddContextParams) {
        let ca_data = params
            .ca_cert
            .as_deref()
            .filter(|pem| !pem.is_empty())
            .map(|pem| STANDARD.encode(pem));
        let cluster = Cluster {
            server: params.server.clone(),
            insecure_skip_tls_verify: ca_data.is_none(),
            certificate_authority_data: ca_data,
            extra: Extra::new(),
        };
        match self.clusters.iter_mut().find(|c| c.name == params.names.cluster) {
            Some(existing) => existing.cluster = cluster,
            None => self.clusters.push(NamedCluster {
                name: params.names.cluster.clone(),
                cluster,
                extra: Extra::new(),
            }),
        }

        let user = User {
            exec: Some(ExecConfig::kube_dc(&params.server)),
            extra: Extra::new(),
        };
        match self.users.iter_mut().find(|u| u.name == params.names.user) {
            Some(existing) => existing.user = user,
            None => self.users.push(NamedUser {
                name: params.names.user.clone(),
                user,
                extra: Extra::new(),
            }),
        }

        let context = Context {
            cluster: params.names.cluster.clone(),
            user: params.names.user.clone(),
            namespace: Some(params.namespace.clone()).filter(|ns| !ns.is_empty()),
            extra: Extra::new(),
        };
        match self.contexts.iter_mut().find(|c| c.name == params.names.context) {
            Some(existing) => existing.context = context,
            None => self.contexts.push(NamedContext {
                name: params.names.context.clone(),
                context,
                extra: Extra::new(),
            }),
        }

        if params.set_current {
            self.current_context = params.names.context.clone();
        }
    }

    /// Remove Kube-DC entries for `server`; returns how many were removed.
    ///
    /// Only convention-named clusters pointing at `server`, the convention
    /// contexts bound to them, and convention users whose exec plugin
    /// targets `server` are touched. If the current context was removed it
    /// moves to the first remaining context, or to none.
    pub fn remove_all(&mut self, server: &str) -> usize {
        let removed_clusters: Vec<String> = self
            .clusters
            .iter()
            .filter(|c| is_kube_dc_cluster(&c.name) && c.cluster.server == server)
            .map(|c| c.name.clone())
            .collect();

        let before = self.clusters.len() + self.users.len() + self.contexts.len();

        self.clusters.retain(|c| !removed_clusters.contains(&c.name));
        self.contexts.retain(|c| {
            !(is_kube_dc_context(&c.name) && removed_clusters.contains(&c.context.cluster))
        });
        self.users.retain(|u| {
            let targets_server = u
                .user
                .exec
                .as_ref()
                .and_then(ExecConfig::server_arg)
                .is_some_and(|s| s == server);
            !(is_kube_dc_user(&u.name) && targets_server)
        });

        let removed = before - (self.clusters.len() + self.users.len() + self.contexts.len());

        if !self.current_context.is_empty() && self.context(&self.current_context).is_none() {
            self.current_context = self
                .contexts
                .first()
                .map(|c| c.name.clone())
                .unwrap_or_default();
        }

        removed
    }

    pub fn context(&self, name: &str) -> Option<&NamedContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    pub fn cluster(&self, name: &str) -> Option<&NamedCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    /// Switch the current context. The context must exist.
    pub fn set_current_context(&mut self, name: &str) -> Result<()> {
        if self.context(name).is_none() {
            return Err(Error::ContextNotFound(name.to_string()));
        }
        self.current_context = name.to_string();
        Ok(())
    }

    /// Set the namespace of the current context.
    pub fn set_namespace(&mut self, namespace: &str) -> Result<()> {
        let current = self.current_context.clone();
        let ctx = self
            .contexts
            .iter_mut()
            .find(|c| c.name == current)
            .ok_or(Error::NoCurrentContext)?;
        ctx.context.namespace = Some(namespace.to_string());
        Ok(())
    }

    /// Convention-named contexts, in document order.
    pub fn kube_dc_contexts(&self) -> impl Iterator<Item = &NamedContext> {
        self.contexts.iter().filter(|c| is_kube_dc_context(&c.name))
    }

    /// The current context, if it is a Kube-DC one.
    pub fn current_kube_dc_context(&self) -> Option<&NamedContext> {
        if !is_kube_dc_context(&self.current_context) {
            return None;
        }
        self.context(&self.current_context)
    }

    /// API server of the current Kube-DC context.
    pub fn current_server(&self) -> Option<&str> {
        let ctx = self.current_kube_dc_context()?;
        self.cluster(&ctx.context.cluster)
            .map(|c| c.cluster.server.as_str())
            .filter(|s| !s.is_empty())
    }
}
