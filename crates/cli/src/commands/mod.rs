//! Subcommand implementations
//!
//! Commands write user-facing output to a caller-supplied writer so the
//! binary can use stdout and tests can capture it. Diagnostics go through
//! `tracing` (stderr).

pub mod contexts;
pub mod credential;
pub mod login;
pub mod logout;
pub mod show;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use kube_dc_auth::CredentialStore;
use kubeconfig::Manager;

use crate::config::Config;

/// Resolved configuration plus accessors for the two local stores.
#[derive(Debug, Clone)]
pub struct Env {
    pub config: Config,
}

impl Env {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn credential_store(&self) -> Result<CredentialStore> {
        CredentialStore::open(self.config.credentials_dir.clone())
            .await
            .context("failed to initialize credentials store")
    }

    pub fn kubeconfig(&self) -> Manager {
        Manager::new(&self.config.kubeconfig)
    }
}

/// `1h2m3s`-style rendering of a remaining lifetime, rounded to seconds.
pub fn format_remaining(remaining: TimeDelta) -> String {
    let total = (remaining.num_milliseconds() + 500).div_euclid(1000).max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m{seconds}s"),
        _ => format!("{hours}h{minutes}m{seconds}s"),
    }
}
