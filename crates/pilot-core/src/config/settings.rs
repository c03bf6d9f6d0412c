use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pilot_types::LogLevel;
use tracing::warn;

use crate::Result;
use crate::store::WritePermissions;
use crate::supervisor::ProcessPolicy;

pub const DEFAULT_SERVER_EXECUTABLE: &str = "PlusServer";
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:18904";

/// Launcher settings (config.json)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Directory holding device-set files; the data directory default is
    /// used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_set_dir: Option<PathBuf>,

    #[serde(default = "default_server_executable")]
    pub server_executable: PathBuf,

    /// Working directory for server processes; defaults to the executable's
    /// directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_working_dir: Option<PathBuf>,

    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default)]
    pub allow_remote_write: bool,

    #[serde(default)]
    pub allow_overwrite: bool,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub process: ProcessSettings,
}

fn default_server_executable() -> PathBuf {
    PathBuf::from(DEFAULT_SERVER_EXECUTABLE)
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_set_dir: None,
            server_executable: default_server_executable(),
            server_working_dir: None,
            listen_address: default_listen_address(),
            allow_remote_write: false,
            allow_overwrite: false,
            log_level: LogLevel::default(),
            process: ProcessSettings::default(),
        }
    }
}

/// Server process timing, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSettings {
    #[serde(default = "default_start_grace_ms")]
    pub start_grace_ms: u64,

    #[serde(default = "default_stop_retry_ms")]
    pub stop_retry_ms: u64,

    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_start_grace_ms() -> u64 {
    500
}

fn default_stop_retry_ms() -> u64 {
    300
}

fn default_stop_timeout_ms() -> u64 {
    15_000
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            start_grace_ms: default_start_grace_ms(),
            stop_retry_ms: default_stop_retry_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl ProcessSettings {
    #[must_use]
    pub fn policy(&self) -> ProcessPolicy {
        ProcessPolicy {
            start_grace: Duration::from_millis(self.start_grace_ms),
            stop_retry: Duration::from_millis(self.stop_retry_ms.max(1)),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

impl Settings {
    /// Load settings from file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let mut settings: Self = serde_json::from_str(&content)?;
        if settings.log_level == LogLevel::Undefined {
            warn!("config.json: logLevel UNDEFINED is not a launcher level, using INFO");
            settings.log_level = LogLevel::Info;
        }
        Ok(settings)
    }

    /// Save settings to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn permissions(&self) -> WritePermissions {
        WritePermissions {
            allow_write: self.allow_remote_write,
            allow_overwrite: self.allow_overwrite,
        }
    }

    /// The configured device-set directory, or `fallback`.
    #[must_use]
    pub fn device_set_dir_or(&self, fallback: &Path) -> PathBuf {
        self.device_set_dir
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.server_executable, PathBuf::from("PlusServer"));
        assert_eq!(settings.listen_address, "127.0.0.1:18904");
        assert!(!settings.allow_remote_write);
        assert!(!settings.allow_overwrite);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.process.policy(), ProcessPolicy::default());
    }

    #[test]
    fn test_settings_load_nonexistent_returns_default() {
        let settings = Settings::load(Path::new("/nonexistent/path/config.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"allowRemoteWrite": true, "logLevel": "DEBUG", "process": {{"stopTimeoutMs": 2000}}}}"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert!(settings.allow_remote_write);
        assert!(!settings.allow_overwrite);
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.process.stop_timeout_ms, 2000);
        assert_eq!(settings.process.start_grace_ms, 500);
        assert_eq!(
            settings.permissions(),
            WritePermissions {
                allow_write: true,
                allow_overwrite: false
            }
        );
    }

    #[test]
    fn test_settings_load_undefined_level_becomes_info() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"logLevel": "UNDEFINED"}}"#).unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.log_level, LogLevel::Info);
    }

    #[test]
    fn test_settings_load_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{invalid json}}").unwrap();
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn test_settings_save_and_load() {
        let settings = Settings {
            device_set_dir: Some(PathBuf::from("/data/sets")),
            allow_overwrite: true,
            log_level: LogLevel::Trace,
            ..Settings::default()
        };

        let file = NamedTempFile::new().unwrap();
        settings.save(file.path()).unwrap();

        let loaded = Settings::load(file.path()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_device_set_dir_fallback() {
        let fallback = Path::new("/home/user/.local/share/pilot/device-sets");
        assert_eq!(
            Settings::default().device_set_dir_or(fallback),
            fallback.to_path_buf()
        );

        let settings = Settings {
            device_set_dir: Some(PathBuf::from("/srv/sets")),
            ..Settings::default()
        };
        assert_eq!(settings.device_set_dir_or(fallback), PathBuf::from("/srv/sets"));
    }

    #[test]
    fn test_zero_retry_is_clamped() {
        let process = ProcessSettings {
            stop_retry_ms: 0,
            ..ProcessSettings::default()
        };
        assert_eq!(process.policy().stop_retry, Duration::from_millis(1));
    }
}
