//! `kube-dc config show`

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kube_dc_auth::{CredentialRecord, CredentialStore};
use kubeconfig::Manager;

use super::{Env, format_remaining};

pub async fn run(env: &Env, out: &mut impl Write) -> Result<()> {
    let store = env.credential_store().await;
    show(&env.kubeconfig(), store.as_ref().ok(), Utc::now(), out).await?;
    if let Err(e) = store {
        writeln!(out, "Error loading credentials: {e:#}")?;
    }
    Ok(())
}

/// Current kubeconfig context followed by every cached credential.
pub async fn show(
    kube: &Manager,
    store: Option<&CredentialStore>,
    now: DateTime<Utc>,
    out: &mut impl Write,
) -> Result<()> {
    let cfg = kube.load().context("failed to load kubeconfig")?;

    writeln!(out, "=== Current Context ===")?;
    writeln!(out, "Context: {}", cfg.current_context)?;
    if let Some(ctx) = cfg.context(&cfg.current_context) {
        writeln!(
            out,
            "Namespace: {}",
            ctx.context.namespace.as_deref().unwrap_or_default()
        )?;
        if let Some(cluster) = cfg.cluster(&ctx.context.cluster) {
            writeln!(out, "Server: {}", cluster.cluster.server)?;
        }
    }

    writeln!(out, "\n=== Cached Credentials ===")?;
    let Some(store) = store else {
        return Ok(());
    };
    let records = match store.list().await {
        Ok(records) => records,
        Err(e) => {
            writeln!(out, "Error listing credentials: {e}")?;
            return Ok(());
        }
    };
    if records.is_empty() {
        writeln!(out, "No cached credentials.")?;
        return Ok(());
    }

    for record in &records {
        write_record(record, now, out)?;
    }
    Ok(())
}

fn write_record(record: &CredentialRecord, now: DateTime<Utc>, out: &mut impl Write) -> Result<()> {
    writeln!(out, "\nServer: {}", record.server)?;
    writeln!(out, "  User: {}", record.user.email)?;
    writeln!(out, "  Organization: {}", record.user.org)?;
    writeln!(out, "  Groups: [{}]", record.user.groups.join(", "))?;
    writeln!(out, "  Namespaces: [{}]", record.user.namespaces.join(", "))?;

    if record.is_access_token_valid_at(now) {
        writeln!(
            out,
            "  Access Token: valid (expires in {})",
            format_remaining(record.access_token_expiry - now)
        )?;
    } else {
        writeln!(out, "  Access Token: expired")?;
    }

    if record.is_refresh_token_valid_at(now) {
        writeln!(
            out,
            "  Refresh Token: valid (expires in {})",
            format_remaining(record.refresh_token_expiry - now)
        )?;
    } else {
        writeln!(out, "  Refresh Token: expired (re-login required)")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use kube_dc_auth::UserInfo;
    use kubeconfig::{AddContextParams, ContextNames, ContextSync};
    use tempfile::TempDir;

    const SERVER: &str = "https://kube-api.stage.kube-dc.com:6443";

    #[tokio::test]
    async fn shows_context_and_token_status() {
        let dir = TempDir::new().unwrap();
        let kube = Manager::new(dir.path().join("kubeconfig"));
        kube.upsert(&AddContextParams {
            server: SERVER.into(),
            names: ContextNames::new("stage.kube-dc.com", "shalb", "shalb-dev"),
            namespace: "shalb-dev".into(),
            ca_cert: None,
            insecure: false,
            set_current: true,
        })
        .unwrap();

        let store = CredentialStore::open(dir.path().join("credentials"))
            .await
            .unwrap();
        let now = Utc::now();
        store
            .save(&mut CredentialRecord {
                server: SERVER.into(),
                keycloak_url: "https://login.stage.kube-dc.com".into(),
                realm: "shalb".into(),
                client_id: "kube-dc".into(),
                access_token: "at".into(),
                refresh_token: "rt".into(),
                id_token: None,
                access_token_expiry: now + TimeDelta::seconds(10),
                refresh_token_expiry: now + TimeDelta::seconds(1800),
                user: UserInfo {
                    email: "a@b.com".into(),
                    org: "shalb".into(),
                    groups: vec!["org-admin".into()],
                    namespaces: vec!["shalb-dev".into()],
                },
                ca_cert: None,
                insecure: false,
                created_at: None,
                updated_at: None,
            })
            .await
            .unwrap();

        let mut out = Vec::new();
        show(&kube, Some(&store), now, &mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("Context: kube-dc/stage.kube-dc.com/shalb/dev\n"));
        assert!(out.contains("Namespace: shalb-dev\n"));
        assert!(out.contains(&format!("Server: {SERVER}\n")));
        assert!(out.contains("  Groups: [org-admin]\n"));
        // Inside the 30s skew window
        assert!(out.contains("  Access Token: expired\n"));
        assert!(out.contains("  Refresh Token: valid (expires in 30m0s)\n"));
    }

    #[tokio::test]
    async fn empty_cache_is_reported() {
        let dir = TempDir::new().unwrap();
        let kube = Manager::new(dir.path().join("kubeconfig"));
        let store = CredentialStore::open(dir.path().join("credentials"))
            .await
            .unwrap();

        let mut out = Vec::new();
        show(&kube, Some(&store), Utc::now(), &mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("No cached credentials.\n"));
    }
}
