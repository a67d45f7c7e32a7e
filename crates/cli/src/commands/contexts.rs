//! `kube-dc use`, `kube-dc ns` and `kube-dc config get-contexts`

use std::io::Write;

use anyhow::{Context, Result};
use kube_dc_auth::{CredentialStore, domain_from_server, parse_unverified};
use kubeconfig::{Manager, full_context_name, parse_context_name};

use super::Env;
use crate::error::Error;

pub fn run_use(target: Option<String>, env: &Env, out: &mut impl Write) -> Result<()> {
    use_context(&env.kubeconfig(), target.as_deref(), out)
}

pub async fn run_ns(namespace: Option<String>, env: &Env, out: &mut impl Write) -> Result<()> {
    let store = env.credential_store().await?;
    switch_namespace(&env.kubeconfig(), &store, namespace.as_deref(), out).await
}

/// List Kube-DC contexts (current marked `*`) or switch to `target`.
pub fn use_context(kube: &Manager, target: Option<&str>, out: &mut impl Write) -> Result<()> {
    let cfg = kube.load().context("failed to load kubeconfig")?;
    let available: Vec<String> = cfg.kube_dc_contexts().map(|c| c.name.clone()).collect();
    if available.is_empty() {
        return Err(Error::NoContexts.into());
    }

    let Some(target) = target else {
        writeln!(out, "Available kube-dc contexts:")?;
        for name in &available {
            let marker = if *name == cfg.current_context { "* " } else { "  " };
            writeln!(out, "{marker}{name}")?;
        }
        return Ok(());
    };

    let name = full_context_name(target);
    if !available.contains(&name) {
        return Err(Error::UnknownContext { name, available }.into());
    }

    kube.set_current_context(&name)
        .context("failed to switch context")?;
    writeln!(out, "Switched to context: {name}")?;
    Ok(())
}

/// List or switch namespaces of the current Kube-DC context.
///
/// Only namespaces granted to the logged-in identity are accepted.
pub async fn switch_namespace(
    kube: &Manager,
    store: &CredentialStore,
    target: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let cfg = kube.load().context("failed to load kubeconfig")?;
    let ctx = cfg
        .current_kube_dc_context()
        .ok_or_else(|| Error::NotKubeDcContext(cfg.current_context.clone()))?;
    let server = cfg.current_server().ok_or(Error::NoServerForContext)?;
    let current_namespace = ctx.context.namespace.clone().unwrap_or_default();

    let record = store.load(server).await.map_err(|_| Error::NotLoggedIn {
        domain: domain_from_server(server),
        org: parse_context_name(&ctx.name)
            .map(|(_, org, _)| org.to_string())
            .unwrap_or_else(|| "<your-org>".into()),
    })?;

    let mut namespaces = record.user.namespaces.clone();
    if namespaces.is_empty() {
        if let Ok(claims) = parse_unverified(&record.access_token) {
            namespaces = claims.namespaces;
        }
    }
    if namespaces.is_empty() {
        return Err(Error::NoNamespaces.into());
    }

    let Some(target) = target else {
        writeln!(out, "Available namespaces:")?;
        for ns in &namespaces {
            let marker = if *ns == current_namespace { "* " } else { "  " };
            writeln!(out, "{marker}{ns}")?;
        }
        return Ok(());
    };

    if !namespaces.iter().any(|ns| ns == target) {
        return Err(Error::NamespaceNotAllowed {
            namespace: target.to_string(),
            allowed: namespaces,
        }
        .into());
    }

    kube.set_namespace(target)
        .context("failed to set namespace")?;
    writeln!(out, "Switched to namespace: {target}")?;
    Ok(())
}
