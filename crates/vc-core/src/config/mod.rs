//! Configuration management for vllmctl

mod forward;
mod launch;
pub mod serde_utils;

pub use forward::ForwardConfig;
pub use launch::LaunchConfig;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level layout of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// `[forward]` section
    pub forward: ForwardConfig,
    /// `[launch]` section
    pub launch: LaunchConfig,
}

impl ConfigFile {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file at the default location yields defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = match path {
            Some(path) => load_config(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    load_config(&default_path)?
                } else {
                    tracing::debug!("No config at {:?}, using defaults", default_path);
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that deserialize but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forward.remote_port == 0 {
            return Err(ConfigError::Invalid(
                "forward.remote_port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vllmctl")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Expand a leading `~/` against the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ConfigFile::default();
        config.forward.remote_port = 8001;
        config.launch.tensor_parallel_size = 2;
        save_config(&path, &config).unwrap();

        let loaded: ConfigFile = load_config(&path).unwrap();
        assert_eq!(loaded.forward.remote_port, 8001);
        assert_eq!(loaded.launch.tensor_parallel_size, 2);
        assert_eq!(loaded.forward.ssh_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[forward]\nlocal_range = \"17000-17009\"\nremote_probe_timeout = 500\n",
        )
        .unwrap();

        let loaded = ConfigFile::load_or_default(Some(&path)).unwrap();
        assert_eq!(loaded.forward.local_range.to_string(), "17000-17009");
        assert_eq!(loaded.forward.remote_probe_timeout, Duration::from_millis(500));
        assert_eq!(loaded.forward.session_prefix, "vllmctl_");
        assert_eq!(loaded.launch.conda_env, "vllm_env");
    }

    #[test]
    fn test_bad_local_range_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[forward]\nlocal_range = \"17009-17000\"\n").unwrap();

        assert!(matches!(
            ConfigFile::load_or_default(Some(&path)),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_remote_port_zero_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[forward]\nremote_port = 0\n").unwrap();

        assert!(matches!(
            ConfigFile::load_or_default(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            ConfigFile::load_or_default(Some(&path)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/etc/ssh/config"), PathBuf::from("/etc/ssh/config"));
    }
}
