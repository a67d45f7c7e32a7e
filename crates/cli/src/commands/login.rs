//! `kube-dc login`

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use kube_dc_auth::{
    CredentialRecord, CredentialStore, LoginConfig, LoginTarget, LoopbackLogin, TlsOptions,
    TokenSet, api_server_url, identity_provider_url, parse_unverified,
};
use kubeconfig::{ContextSync, LoginContexts, sync_login_contexts};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Env;
use crate::error::Error;

#[derive(Debug, clap::Args)]
pub struct LoginArgs {
    /// Kube-DC domain (e.g. stage.kube-dc.com)
    #[arg(long)]
    pub domain: Option<String>,

    /// Organization (Keycloak realm)
    #[arg(long)]
    pub org: Option<String>,

    /// Path to a PEM CA certificate for self-hosted installations
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification (not recommended)
    #[arg(long)]
    pub insecure: bool,

    /// Use device code flow for headless environments
    #[arg(long)]
    pub device_code: bool,
}

/// What a finished login wrote, for the summary.
#[derive(Debug)]
pub struct LoginSummary {
    pub email: String,
    pub org: String,
    pub namespaces: Vec<String>,
    pub contexts: Vec<String>,
    /// Context the kubeconfig now points at
    pub current_context: Option<String>,
}

pub async fn run(
    args: LoginArgs,
    env: &Env,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<()> {
    let (domain, org) = {
        let mut stdin = std::io::stdin().lock();
        let domain = required(
            args.domain,
            "Enter Kube-DC domain (e.g., stage.kube-dc.com): ",
            "domain is required",
            &mut stdin,
            out,
        )?;
        let org = required(
            args.org,
            "Enter organization (Keycloak realm): ",
            "organization is required",
            &mut stdin,
            out,
        )?;
        (domain, org)
    };

    let ca_cert = match &args.ca_cert {
        Some(path) => {
            let pem = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read CA certificate {}", path.display()))?;
            writeln!(out, "Using CA certificate from {}", path.display())?;
            Some(pem)
        }
        None => None,
    };

    if args.device_code {
        bail!("device code flow not yet implemented");
    }

    let server = api_server_url(&domain);
    let keycloak_url = identity_provider_url(&domain);
    writeln!(out, "\nLogging in to {domain} (org: {org})")?;
    writeln!(out, "   API Server: {server}")?;
    writeln!(out, "   Keycloak:   {keycloak_url}\n")?;

    let tls = TlsOptions {
        ca_cert,
        insecure: args.insecure,
    };
    let target = LoginTarget {
        server,
        keycloak_url: keycloak_url.clone(),
        realm: org.clone(),
        client_id: env.config.client_id.clone(),
        tls: tls.clone(),
    };

    let tokens = LoopbackLogin::new(LoginConfig {
        keycloak_url,
        realm: org,
        client_id: env.config.client_id.clone(),
        tls,
    })
    .login(cancel)
    .await
    .context("login failed")?;
    writeln!(out, "\nAuthentication successful!")?;

    let store = env.credential_store().await?;
    let kube = env.kubeconfig();
    let summary = complete_login(&store, &kube, &domain, target, tokens, Utc::now()).await?;

    writeln!(out, "  User: {}", summary.email)?;
    writeln!(out, "  Organization: {}", summary.org)?;
    if !summary.namespaces.is_empty() {
        writeln!(out, "  Available namespaces: {}", summary.namespaces.join(", "))?;
    }
    writeln!(out, "  Credentials cached to {}", store.dir().display())?;
    writeln!(out, "  Kubeconfig updated in {}", kube.path().display())?;
    if let Some(current) = &summary.current_context {
        writeln!(out, "\nReady! Current context: {current}")?;
        writeln!(out, "\nTry: kubectl get pods")?;
    }
    Ok(())
}

/// Persist a fresh login and write its kubeconfig contexts.
///
/// Saving the record is fatal on failure; individual contexts are not.
pub async fn complete_login(
    store: &CredentialStore,
    kube: &dyn ContextSync,
    domain: &str,
    target: LoginTarget,
    tokens: TokenSet,
    now: DateTime<Utc>,
) -> Result<LoginSummary> {
    let claims = parse_unverified(&tokens.access_token).context("failed to parse token")?;
    let mut record = CredentialRecord::from_login(target, tokens, &claims, now);
    store
        .save(&mut record)
        .await
        .context("failed to save credentials")?;
    info!(server = %record.server, email = %claims.email, "login credentials saved");

    let synced = sync_login_contexts(
        kube,
        &LoginContexts {
            server: &record.server,
            domain,
            org: &record.realm,
            namespaces: &claims.namespaces,
            ca_cert: record.ca_cert.as_deref(),
            insecure: record.insecure,
        },
    );

    Ok(LoginSummary {
        email: claims.email,
        org: claims.org,
        namespaces: claims.namespaces,
        contexts: synced.written,
        current_context: synced.current,
    })
}

/// Use the flag value, or prompt for it. Blank answers are rejected.
fn required(
    value: Option<String>,
    prompt: &str,
    missing: &str,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<String> {
    let value = match value {
        Some(v) => v,
        None => {
            write!(out, "{prompt}")?;
            out.flush()?;
            let mut line = String::new();
            input.read_line(&mut line)?;
            line
        }
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(Error::Validation(missing.to_string()).into());
    }
    Ok(value)
}
