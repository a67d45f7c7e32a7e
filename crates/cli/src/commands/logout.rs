//! `kube-dc logout`

use std::io::Write;

use anyhow::{Context, Result};
use kube_dc_auth::CredentialStore;
use kubeconfig::{ContextSync, Manager};
use tracing::warn;

use super::Env;
use crate::error::Error;

#[derive(Debug, Default, clap::Args)]
pub struct LogoutArgs {
    /// Kube-DC API server URL (defaults to the current kube-dc context)
    #[arg(long)]
    pub server: Option<String>,

    /// Logout from all servers
    #[arg(long)]
    pub all: bool,

    /// Also remove kubeconfig contexts
    #[arg(long)]
    pub remove_contexts: bool,
}

pub async fn run(args: LogoutArgs, env: &Env, out: &mut impl Write) -> Result<()> {
    let store = env.credential_store().await?;
    logout(&store, &env.kubeconfig(), args, out).await
}

pub async fn logout(
    store: &CredentialStore,
    kube: &Manager,
    args: LogoutArgs,
    out: &mut impl Write,
) -> Result<()> {
    if args.all {
        return logout_all(store, kube, args.remove_contexts, out).await;
    }

    let server = match args.server {
        Some(server) => server,
        None => kube
            .load()
            .ok()
            .and_then(|cfg| cfg.current_server().map(str::to_string))
            .ok_or_else(|| {
                Error::Validation(
                    "no server specified and no kube-dc context active. Use --server or --all"
                        .into(),
                )
            })?,
    };

    store
        .delete(&server)
        .await
        .context("failed to remove credentials")?;
    writeln!(out, "Removed credentials for {server}")?;

    if args.remove_contexts {
        match kube.remove_all(&server) {
            Ok(_) => writeln!(out, "Removed kubeconfig contexts.")?,
            Err(e) => {
                warn!(server = %server, error = %e, "failed to remove kubeconfig contexts");
                writeln!(out, "Warning: failed to remove kubeconfig contexts: {e}")?;
            }
        }
    }
    Ok(())
}

async fn logout_all(
    store: &CredentialStore,
    kube: &Manager,
    remove_contexts: bool,
    out: &mut impl Write,
) -> Result<()> {
    let records = store.list().await.context("failed to list credentials")?;
    if records.is_empty() {
        writeln!(out, "No credentials to remove.")?;
        return Ok(());
    }

    for record in &records {
        match store.delete(&record.server).await {
            Ok(()) => writeln!(out, "Removed credentials for {}", record.server)?,
            Err(e) => {
                warn!(server = %record.server, error = %e, "failed to remove credentials");
                writeln!(
                    out,
                    "Warning: failed to remove credentials for {}: {e}",
                    record.server
                )?;
            }
        }

        if remove_contexts {
            if let Err(e) = kube.remove_all(&record.server) {
                warn!(server = %record.server, error = %e, "failed to remove kubeconfig contexts");
            }
        }
    }

    writeln!(out, "Logged out from all servers.")?;
    Ok(())
}
