//! Per-server credential storage
//!
//! Each API server gets one JSON record under an owner-only directory
//! (`~/.kube-dc/credentials` by default). The file name is a short hex
//! prefix of SHA-256(server URL), which keeps names filesystem-safe; a
//! collision between two servers is accepted as a hash-probability risk.
//!
//! Writes go through a temp file + rename so an interrupted write never
//! corrupts the previous record. There is no inter-process locking:
//! concurrent CLI invocations are last-writer-wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::constants::{ACCESS_TOKEN_SKEW, OFFLINE_REFRESH_VALIDITY, REFRESH_TOKEN_SKEW};
use crate::error::{Error, Result};
use crate::token::{TlsOptions, TokenSet};

/// Bytes of the server hash kept in the file name (16 hex characters)
const FILE_HASH_BYTES: usize = 8;

/// Identity attributes copied out of the access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl UserInfo {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            email: claims.email.clone(),
            org: claims.org.clone(),
            groups: claims.groups.clone(),
            namespaces: claims.namespaces.clone(),
        }
    }
}

/// Where a login happened: everything a later refresh needs besides tokens.
#[derive(Debug, Clone)]
pub struct LoginTarget {
    pub server: String,
    pub keycloak_url: String,
    pub realm: String,
    pub client_id: String,
    pub tls: TlsOptions,
}

/// Cached tokens and bookkeeping for one API server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub server: String,
    pub keycloak_url: String,
    pub realm: String,
    pub client_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub access_token_expiry: DateTime<Utc>,
    pub refresh_token_expiry: DateTime<Utc>,
    #[serde(default)]
    pub user: UserInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
    /// Set by the first [`CredentialStore::save`], never changed afterwards
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Strictly increases on every [`CredentialStore::save`]
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// First record for a server after a successful browser login.
    pub fn from_login(
        target: LoginTarget,
        tokens: TokenSet,
        claims: &Claims,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            server: target.server,
            keycloak_url: target.keycloak_url,
            realm: target.realm,
            client_id: target.client_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            id_token: tokens.id_token.filter(|t| !t.is_empty()),
            access_token_expiry: claims.expiry(),
            refresh_token_expiry: refresh_expiry(now, tokens.refresh_expires_in),
            user: UserInfo::from_claims(claims),
            ca_cert: target.tls.ca_cert,
            insecure: target.tls.insecure,
            created_at: None,
            updated_at: None,
        }
    }

    /// Fold a refreshed token set into this record.
    ///
    /// The access-token expiry comes from the token's own `exp` claim. An
    /// empty refresh token or ID token in the response keeps the stored one.
    pub fn apply_refresh(&mut self, tokens: TokenSet, claims: &Claims, now: DateTime<Utc>) {
        self.access_token = tokens.access_token;
        if !tokens.refresh_token.is_empty() {
            self.refresh_token = tokens.refresh_token;
        }
        if let Some(id_token) = tokens.id_token.filter(|t| !t.is_empty()) {
            self.id_token = Some(id_token);
        }
        self.access_token_expiry = claims.expiry();
        self.refresh_token_expiry = refresh_expiry(now, tokens.refresh_expires_in);
        self.user = UserInfo::from_claims(claims);
    }

    pub fn tls_options(&self) -> TlsOptions {
        TlsOptions {
            ca_cert: self.ca_cert.clone(),
            insecure: self.insecure,
        }
    }

    pub fn is_access_token_valid(&self) -> bool {
        self.is_access_token_valid_at(Utc::now())
    }

    /// `now + 30s` must be strictly before the access-token expiry.
    pub fn is_access_token_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + delta(ACCESS_TOKEN_SKEW) < self.access_token_expiry
    }

    pub fn is_refresh_token_valid(&self) -> bool {
        self.is_refresh_token_valid_at(Utc::now())
    }

    /// `now + 60s` must be strictly before the refresh-token expiry.
    pub fn is_refresh_token_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + delta(REFRESH_TOKEN_SKEW) < self.refresh_token_expiry
    }
}

/// Absolute refresh-token expiry for a token response.
///
/// Keycloak reports `refresh_expires_in <= 0` for offline tokens; those get
/// a fixed 30-day window instead of an already-expired timestamp. A lifetime
/// too large to represent is treated the same way.
pub fn refresh_expiry(now: DateTime<Utc>, refresh_expires_in: i64) -> DateTime<Utc> {
    let offline = now + delta(OFFLINE_REFRESH_VALIDITY);
    if refresh_expires_in <= 0 {
        return offline;
    }
    TimeDelta::try_seconds(refresh_expires_in)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(offline)
}

fn delta(d: Duration) -> TimeDelta {
    TimeDelta::seconds(d.as_secs() as i64)
}

/// File name of the record for `server`.
pub fn record_file_name(server: &str) -> String {
    let hash = Sha256::digest(server.as_bytes());
    format!("{}.json", hex::encode(&hash[..FILE_HASH_BYTES]))
}

/// Directory-backed credential store, one file per server.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Open the store, creating the directory with 0700 permissions if needed.
    pub async fn open(dir: PathBuf) -> Result<Self> {
        create_private_dir(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, server: &str) -> PathBuf {
        self.dir.join(record_file_name(server))
    }

    /// Load the record for `server`.
    ///
    /// Returns [`Error::NotFound`] when no record exists and
    /// [`Error::CredentialParse`] when the file is unreadable as a record.
    pub async fn load(&self, server: &str) -> Result<CredentialRecord> {
        let path = self.path_for(server);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("no credentials found for {server}")));
            }
            Err(e) => return Err(Error::Io(format!("reading credentials: {e}"))),
        };

        serde_json::from_str(&contents)
            .map_err(|e| Error::CredentialParse(format!("parsing {}: {e}", path.display())))
    }

    /// Upsert a record.
    ///
    /// Stamps `created_at` on the first write and moves `updated_at` strictly
    /// forward on every write, even when the clock has not advanced.
    pub async fn save(&self, record: &mut CredentialRecord) -> Result<()> {
        let now = Utc::now();
        let updated_at = match record.updated_at {
            Some(prev) if now <= prev => prev + TimeDelta::microseconds(1),
            _ => now,
        };
        record.updated_at = Some(updated_at);
        record.created_at.get_or_insert(updated_at);

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

        create_private_dir(&self.dir).await?;
        write_atomic(&self.path_for(&record.server), json.as_bytes()).await?;
        debug!(server = %record.server, "saved credentials");
        Ok(())
    }

    /// Remove the record for `server`. Absence is not an error.
    pub async fn delete(&self, server: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(server)).await {
            Ok(()) => {
                debug!(server, "deleted credentials");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("deleting credentials: {e}"))),
        }
    }

    /// Every decodable record. Files that fail to read or parse are skipped.
    pub async fn list(&self) -> Result<Vec<CredentialRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(format!("listing credentials: {e}"))),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Io(format!("listing credentials: {e}")))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if !is_file || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => serde_json::from_str::<CredentialRecord>(&contents)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable credential file"),
            }
        }

        records.sort_by(|a, b| a.server.cmp(&b.server));
        Ok(records)
    }
}

async fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
        .create(dir)
        .await
        .map_err(|e| Error::Io(format!("creating credentials directory {}: {e}", dir.display())))
}

/// Write a file atomically with 0600 permissions.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target, so a crash mid-write leaves the old content intact.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?;

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(format!("renaming temp credential file: {e}")));
    }

    Ok(())
}
