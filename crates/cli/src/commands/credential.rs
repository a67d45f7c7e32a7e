//! `kube-dc credential`: the kubectl exec-credential plugin
//!
//! stdout carries exactly one JSON document; everything else goes to stderr.

use std::io::Write;

use anyhow::Result;
use kube_dc_credential::CredentialProvider;

use super::Env;

#[derive(Debug, clap::Args)]
pub struct CredentialArgs {
    /// Kube-DC API server URL
    #[arg(long)]
    pub server: String,
}

pub async fn run(args: CredentialArgs, env: &Env, out: &mut impl Write) -> Result<()> {
    let provider = CredentialProvider::new(env.credential_store().await?);
    let credential = provider.get_credential(&args.server).await?;
    writeln!(out, "{}", credential.to_json()?)?;
    Ok(())
}
