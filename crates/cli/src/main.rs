//! Kube-DC CLI
//!
//! Browser-based login for Kube-DC clusters and the kubectl exec-credential
//! plugin that keeps the cached token fresh:
//! 1. `kube-dc login` runs the PKCE browser flow, caches the tokens and
//!    writes one kubeconfig context per granted namespace
//! 2. kubectl invokes `kube-dc credential --server <url>` for every request
//! 3. `use`, `ns` and `config` inspect and switch the written contexts
//!
//! stdout is reserved for command output (the ExecCredential JSON for
//! `credential`); logs go to stderr.

mod commands;
mod config;
mod error;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Env;
use crate::commands::credential::CredentialArgs;
use crate::commands::login::LoginArgs;
use crate::commands::logout::LogoutArgs;
use crate::config::Config;

#[derive(Debug, Parser)]
#[command(
    name = "kube-dc",
    version,
    about = "Kube-DC CLI - Kubernetes authentication for Kube-DC clusters"
)]
struct Cli {
    /// Path to the CLI config file
    #[arg(long, global = true, env = "KUBE_DC_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authenticate with a Kube-DC server
    Login(LoginArgs),

    /// Remove cached credentials
    Logout(LogoutArgs),

    /// Get credentials for kubectl (exec plugin)
    Credential(CredentialArgs),

    /// Switch between kube-dc contexts (domain/org/project)
    Use {
        /// Context to switch to; lists contexts when omitted
        target: Option<String>,
    },

    /// Switch namespace within the current kube-dc context
    Ns {
        /// Namespace to switch to; lists namespaces when omitted
        namespace: Option<String>,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Show current configuration and credentials
    Show,

    /// List all kube-dc contexts
    GetContexts,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Command::Version = cli.command {
        println!("kube-dc CLI {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!(
        credentials_dir = %config.credentials_dir.display(),
        kubeconfig = %config.kubeconfig.display(),
        "configuration loaded"
    );
    let env = Env::new(config);
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::Login(args) => {
            let cancel = CancellationToken::new();
            let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));
            let result = commands::login::run(args, &env, &cancel, &mut stdout).await;
            watcher.abort();
            result
        }
        Command::Logout(args) => commands::logout::run(args, &env, &mut stdout).await,
        Command::Credential(args) => commands::credential::run(args, &env, &mut stdout).await,
        Command::Use { target } => commands::contexts::run_use(target, &env, &mut stdout),
        Command::Ns { namespace } => {
            commands::contexts::run_ns(namespace, &env, &mut stdout).await
        }
        Command::Config { action } => match action {
            ConfigAction::Show => commands::show::run(&env, &mut stdout).await,
            ConfigAction::GetContexts => commands::contexts::run_use(None, &env, &mut stdout),
        },
        Command::Version => Ok(()),
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, cancelling login"),
        _ = terminate => info!("received SIGTERM, cancelling login"),
    }
    token.cancel();
}
