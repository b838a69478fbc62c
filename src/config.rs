// src/config.rs

//! Runtime configuration: built-in defaults, then `config.json` in the user's config
//! directory, then `ASSETSCAN_*` environment variables. CLI flags are applied on top
//! by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::models::{DEFAULT_AUDIT_TIMEOUT, DEFAULT_TOOL_TIMEOUT};
use crate::core::platform::PlatformOptions;
use crate::logging::project_directory;

pub const CONFIG_FILE: &str = "config.json";

const ENV_CACHE_DIR: &str = "ASSETSCAN_CACHE_DIR";
const ENV_TOOL_TIMEOUT: &str = "ASSETSCAN_TOOL_TIMEOUT_SECS";
const ENV_AUDIT_TIMEOUT: &str = "ASSETSCAN_AUDIT_TIMEOUT_SECS";
const ENV_AUDIT_SUDO: &str = "ASSETSCAN_AUDIT_SUDO";
const ENV_WSL_BRIDGE: &str = "ASSETSCAN_WSL_BRIDGE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid configuration: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{var}={value:?} is not a valid value")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub cache_dir: PathBuf,
    pub tool_timeout_secs: u64,
    pub audit_timeout_secs: u64,
    pub use_sudo_for_audit: bool,
    pub enable_wsl_bridge: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT.as_secs(),
            audit_timeout_secs: DEFAULT_AUDIT_TIMEOUT.as_secs(),
            use_sudo_for_audit: false,
            enable_wsl_bridge: true,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    match project_directory() {
        Some(dirs) => dirs.cache_dir().join("snapshots"),
        None => PathBuf::from(".").join(".cache").join("snapshots"),
    }
}

pub fn config_path() -> Option<PathBuf> {
    project_directory().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

impl ScanConfig {
    /// Defaults, overlaid with the config file (if any) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults.");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `ASSETSCAN_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|d| !d.trim().is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_TOOL_TIMEOUT) {
            self.tool_timeout_secs = parse_secs(ENV_TOOL_TIMEOUT, value)?;
        }
        if let Some(value) = lookup(ENV_AUDIT_TIMEOUT) {
            self.audit_timeout_secs = parse_secs(ENV_AUDIT_TIMEOUT, value)?;
        }
        if let Some(value) = lookup(ENV_AUDIT_SUDO) {
            self.use_sudo_for_audit = parse_flag(ENV_AUDIT_SUDO, value)?;
        }
        if let Some(value) = lookup(ENV_WSL_BRIDGE) {
            self.enable_wsl_bridge = parse_flag(ENV_WSL_BRIDGE, value)?;
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_secs(self.audit_timeout_secs)
    }

    pub fn platform_options(&self) -> PlatformOptions {
        PlatformOptions {
            use_sudo_for_audit: self.use_sudo_for_audit,
            enable_wsl_bridge: self.enable_wsl_bridge,
        }
    }
}

fn parse_secs(var: &'static str, value: String) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}

fn parse_flag(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::from_file(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ScanConfig::default());
        assert_eq!(config.tool_timeout(), Duration::from_secs(120));
        assert_eq!(config.audit_timeout(), Duration::from_secs(900));
        assert!(config.enable_wsl_bridge);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "tool_timeout_secs": 30, "use_sudo_for_audit": true }"#)
            .unwrap();
        let config = ScanConfig::from_file(&path).unwrap();
        assert_eq!(config.tool_timeout_secs, 30);
        assert!(config.use_sudo_for_audit);
        assert_eq!(config.audit_timeout_secs, 900);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ tool_timeout_secs: ").unwrap();
        assert!(matches!(
            ScanConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = ScanConfig::default();
        config
            .apply_env(env(&[
                (ENV_CACHE_DIR, "/tmp/assetscan"),
                (ENV_AUDIT_TIMEOUT, "60"),
                (ENV_AUDIT_SUDO, "1"),
                (ENV_WSL_BRIDGE, "false"),
            ]))
            .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/assetscan"));
        assert_eq!(config.audit_timeout_secs, 60);
        assert_eq!(
            config.platform_options(),
            PlatformOptions {
                use_sudo_for_audit: true,
                enable_wsl_bridge: false,
            }
        );
    }

    #[test]
    fn invalid_environment_values_are_rejected() {
        let mut config = ScanConfig::default();
        let err = config
            .apply_env(env(&[(ENV_TOOL_TIMEOUT, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_TOOL_TIMEOUT, .. }));
        assert!(config.apply_env(env(&[(ENV_TOOL_TIMEOUT, "0")])).is_err());
        assert!(config.apply_env(env(&[(ENV_AUDIT_SUDO, "maybe")])).is_err());
    }
}
