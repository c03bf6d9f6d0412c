use directories::ProjectDirs;
use std::path::PathBuf;

use crate::{Error, Result};

/// Launcher directories following the platform conventions
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/pilot)
    pub config: PathBuf,

    /// Data directory (~/.local/share/pilot)
    pub data: PathBuf,

    /// Settings file path
    pub config_file: PathBuf,

    /// Default device-set directory (~/.local/share/pilot/device-sets)
    pub device_sets: PathBuf,
}

impl Directories {
    /// Resolve the standard per-user paths.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no home directory can be determined.
    pub fn new() -> Result<Self> {
        let project = ProjectDirs::from("", "", "pilot")
            .ok_or_else(|| Error::Config("unable to determine home directory".to_string()))?;

        let config = project.config_dir().to_path_buf();
        let data = project.data_dir().to_path_buf();

        Ok(Self {
            config_file: config.join("config.json"),
            device_sets: data.join("device-sets"),
            config,
            data,
        })
    }

    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_file: base.join("config.json"),
            device_sets: base.join("device-sets"),
            config: base.clone(),
            data: base,
        }
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.data)?;
        std::fs::create_dir_all(&self.device_sets)?;
        Ok(())
    }
}
