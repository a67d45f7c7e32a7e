//! CLI configuration
//!
//! Precedence: CLI flags > env vars (`KUBE_DC_CONFIG`, `KUBECONFIG`) > config file > defaults.
//! The file is optional TOML at `--config`, `KUBE_DC_CONFIG`, or
//! `~/.kube-dc/config.toml`. Only an explicitly named file has to exist.
//!
//! ```toml
//! [auth]
//! client_id = "kube-dc"
//!
//! [paths]
//! credentials_dir = "~/.kube-dc/credentials"
//! kubeconfig = "~/.kube/config"
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use kube_dc_auth::DEFAULT_CLIENT_ID;
use serde::Deserialize;

/// Directory under `$HOME` holding the config file and credential cache
const STATE_DIR: &str = ".kube-dc";

/// On-disk shape of the config file; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    auth: AuthSection,
    paths: PathsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthSection {
    client_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PathsSection {
    credentials_dir: Option<PathBuf>,
    kubeconfig: Option<PathBuf>,
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub client_id: String,
    pub credentials_dir: PathBuf,
    pub kubeconfig: PathBuf,
}

impl Config {
    /// Load from `explicit` (already merged from `--config` / `KUBE_DC_CONFIG`)
    /// or the default location, then fill defaults.
    pub fn load(explicit: Option<&Path>) -> common::Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| common::Error::Config("cannot determine home directory".into()))?;
        Self::load_with(explicit, &home, std::env::var_os("KUBECONFIG"))
    }

    fn load_with(
        explicit: Option<&Path>,
        home: &Path,
        kubeconfig_env: Option<OsString>,
    ) -> common::Result<Self> {
        let file = match explicit {
            Some(path) => read_file_config(path)?,
            None => {
                let path = home.join(STATE_DIR).join("config.toml");
                if path.exists() {
                    read_file_config(&path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        let client_id = file
            .auth
            .client_id
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        if client_id.trim().is_empty() {
            return Err(common::Error::Config("auth.client_id must not be empty".into()));
        }

        let credentials_dir = file
            .paths
            .credentials_dir
            .map(|p| expand_home(&p, home))
            .unwrap_or_else(|| home.join(STATE_DIR).join("credentials"));

        let kubeconfig = kubeconfig_from_env(kubeconfig_env)
            .or_else(|| file.paths.kubeconfig.map(|p| expand_home(&p, home)))
            .unwrap_or_else(|| home.join(".kube").join("config"));

        Ok(Self {
            client_id,
            credentials_dir,
            kubeconfig,
        })
    }
}

fn read_file_config(path: &Path) -> common::Result<FileConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!("failed to read config {}: {e}", path.display()))
    })?;
    Ok(toml::from_str(&contents)?)
}

/// First entry of a `KUBECONFIG` list; kube-dc edits a single file.
fn kubeconfig_from_env(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty())
}

fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
