//! Device-set configuration directory.
//!
//! Remote clients may list and upload configuration files. Uploads are gated
//! by two operator flags and never escape the directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::{Error, Result};

const CONFIG_EXTENSION: &str = "xml";
const BACKUP_SUFFIX: &str = ".bak";

/// Operator-controlled switches for remote uploads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WritePermissions {
    pub allow_write: bool,
    pub allow_overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    permissions: WritePermissions,
}

impl ConfigStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, permissions: WritePermissions) -> Self {
        Self {
            dir: dir.into(),
            permissions,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn permissions(&self) -> WritePermissions {
        self.permissions
    }

    pub fn set_permissions(&mut self, permissions: WritePermissions) {
        if permissions != self.permissions {
            info!(
                "Config upload permissions changed: write={}, overwrite={}",
                permissions.allow_write, permissions.allow_overwrite
            );
        }
        self.permissions = permissions;
    }

    /// File names with an `.xml` extension (any case), sorted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                Path::new(name)
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(CONFIG_EXTENSION))
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Path of a config file inside the store; directory components of `name`
    /// are discarded.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFileName` if nothing usable is left of `name`.
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        Ok(self.dir.join(sanitize_file_name(name)?))
    }

    /// Read a config file by name.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the file does not exist, `Error::Io` on
    /// other read failures.
    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.path_of(name)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })
    }

    /// Store `content` under `requested_name` and return the name actually used.
    ///
    /// Without overwrite permission an existing file is never touched; the
    /// upload gets the first free `name[i]` instead. With it, the old file is
    /// backed up to `name.bak` and restored if writing fails.
    ///
    /// # Errors
    ///
    /// `Error::PermissionDenied` if uploads are disabled,
    /// `Error::InvalidFileName` for names without a file component, and
    /// `Error::Io` if the file cannot be written.
    pub fn add(&self, requested_name: &str, content: &str) -> Result<String> {
        self.add_with(requested_name, content, write_file)
    }

    fn add_with<F>(&self, requested_name: &str, content: &str, write: F) -> Result<String>
    where
        F: FnOnce(&Path, &[u8]) -> io::Result<()>,
    {
        if !self.permissions.allow_write {
            return Err(Error::PermissionDenied);
        }

        let base_name = sanitize_file_name(requested_name)?;
        let mut file_name = base_name.to_string();
        let mut path = self.dir.join(&file_name);
        let mut backup = None;

        if path.exists() {
            if self.permissions.allow_overwrite {
                let backup_path = self.dir.join(format!("{file_name}{BACKUP_SUFFIX}"));
                fs::copy(&path, &backup_path)?;
                fs::remove_file(&path)?;
                debug!("Backed up {} before overwrite", path.display());
                backup = Some(backup_path);
            } else {
                let mut index = 0u32;
                loop {
                    file_name = format!("{base_name}[{index}]");
                    path = self.dir.join(&file_name);
                    if !path.exists() {
                        break;
                    }
                    index += 1;
                }
                info!("{base_name} already exists, storing upload as {file_name}");
            }
        }

        match write(&path, content.as_bytes()) {
            Ok(()) => {
                if let Some(backup_path) = backup
                    && let Err(e) = fs::remove_file(&backup_path)
                {
                    warn!("Failed to remove backup {}: {e}", backup_path.display());
                }
                info!("Stored device set configuration {}", path.display());
                Ok(file_name)
            }
            Err(e) => {
                error!("Failed to write {}: {e}", path.display());
                if let Some(backup_path) = backup {
                    restore_backup(&backup_path, &path);
                } else if path.exists() {
                    let _ = fs::remove_file(&path);
                }
                Err(Error::Io(e))
            }
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn restore_backup(backup_path: &Path, path: &Path) {
    if path.exists() {
        let _ = fs::remove_file(path);
    }
    match fs::rename(backup_path, path) {
        Ok(()) => info!("Restored {} from backup", path.display()),
        Err(e) => error!(
            "Failed to restore {} from {}: {e}",
            path.display(),
            backup_path.display()
        ),
    }
}

/// Keep only the final path component, accepting both `/` and `\` separators.
fn sanitize_file_name(name: &str) -> Result<&str> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(Error::InvalidFileName(name.to_string()));
    }
    Ok(base)
}
