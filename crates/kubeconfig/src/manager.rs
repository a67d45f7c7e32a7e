//! kubeconfig file access
//!
//! Every edit is load, modify, save. Saves go through a temp file + rename
//! with 0600 permissions so an interrupted write keeps the previous file.
//! There is no locking against concurrent kubectl or kube-dc writers.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::document::Kubeconfig;
use crate::error::{Error, Result};
use crate::sync::{AddContextParams, ContextSync};

/// A kubeconfig file on disk.
#[derive(Debug, Clone)]
pub struct Manager {
    path: PathBuf,
}

impl Manager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document. A missing file is an empty config.
    pub fn load(&self) -> Result<Kubeconfig> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Kubeconfig::parse(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Kubeconfig::default()),
            Err(e) => Err(Error::Io(format!(
                "reading {}: {e}",
                self.path.display()
            ))),
        }
    }

    pub fn save(&self, config: &Kubeconfig) -> Result<()> {
        let yaml = config.to_yaml()?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_private_dir(dir)?;
        }
        write_atomic(&self.path, yaml.as_bytes())?;
        debug!(path = %self.path.display(), "kubeconfig saved");
        Ok(())
    }

    fn update<T>(&self, edit: impl FnOnce(&mut Kubeconfig) -> Result<T>) -> Result<T> {
        let mut config = self.load()?;
        let out = edit(&mut config)?;
        self.save(&config)?;
        Ok(out)
    }

    pub fn set_current_context(&self, name: &str) -> Result<()> {
        self.update(|cfg| cfg.set_current_context(name))
    }

    pub fn set_namespace(&self, namespace: &str) -> Result<()> {
        self.update(|cfg| cfg.set_namespace(namespace))
    }
}

impl ContextSync for Manager {
    fn upsert(&self, params: &AddContextParams) -> Result<()> {
        self.update(|cfg| {
            cfg.upsert(params);
            Ok(())
        })
    }

    fn remove_all(&self, server: &str) -> Result<usize> {
        self.update(|cfg| Ok(cfg.remove_all(server)))
    }
}

fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|e| Error::Io(format!("creating {}: {e}", dir.display())))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Io(format!("{} has no file name", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, data)
        .map_err(|e| Error::Io(format!("writing temp kubeconfig: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Io(format!("setting kubeconfig permissions: {e}")))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(format!("renaming temp kubeconfig: {e}")));
    }
    Ok(())
}
