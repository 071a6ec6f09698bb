//! Configuration management
//!
//! This module handles loading and saving the urio configuration file.
//! The configuration file is stored in TOML format at
//! `$URIO_CONFIG_DIR/config.toml` or `<config dir>/urio/config.toml`.
//!
//! Changes to `schema_version` require migration support.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::connections::{Connections, DEFAULT_ENV_PREFIX};
use crate::error::{Error, Result};
use crate::uri::Uri;

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable that overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "URIO_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Named connections, alias → URI string
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Prefix of `PREFIX__CONN__NAME` environment variables
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// Timeouts applied when a URI does not override them
    #[serde(default)]
    pub timeout: TimeoutConfig,
}

/// Connect and I/O timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Per-operation I/O timeout in milliseconds
    #[serde(default = "default_io_timeout")]
    pub io_ms: u64,
}

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_io_timeout() -> u64 {
    30000
}

impl TimeoutConfig {
    pub fn connect(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_ms)
    }

    pub fn io(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.io_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            io_ms: default_io_timeout(),
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            env_prefix: default_env_prefix(),
            timeout: TimeoutConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            connections: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Parse the `[connections]` table into a snapshot
    pub fn connections(&self) -> Result<Connections> {
        let mut connections = Connections::new();
        for (name, raw) in &self.connections {
            connections.insert(name, Uri::parse(raw)?)?;
        }
        Ok(connections)
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(Self::with_path(PathBuf::from(dir).join("config.toml")));
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".into()))?;
        Ok(Self::with_path(config_dir.join("urio").join("config.toml")))
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {e}", self.config_path.display()))
        })?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config.schema_version = SCHEMA_VERSION;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade urio.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        tracing::debug!(
            path = %self.config_path.display(),
            connections = config.connections.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only).
    pub fn save(&self, config: &Config) -> Result<()> {
        let io_err =
            |e: std::io::Error| Error::Config(format!("{}: {e}", self.config_path.display()));

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions).map_err(io_err)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = ConfigManager::with_path(config_path);
        (manager, temp_dir)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.defaults.env_prefix, "URIO");
        assert_eq!(config.defaults.timeout.connect_ms, 5000);
        assert_eq!(config.defaults.timeout.io_ms, 30000);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let (manager, _temp_dir) = temp_config_manager();
        let config = manager.load().unwrap();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_save_and_load() {
        let (manager, _temp_dir) = temp_config_manager();

        let mut config = Config::default();
        config.defaults.timeout.io_ms = 1000;
        config
            .connections
            .insert("WAREHOUSE".into(), "postgresql://u:p@db/analytics".into());

        manager.save(&config).unwrap();
        let loaded = manager.load().unwrap();

        assert_eq!(loaded.defaults.timeout.io_ms, 1000);
        let connections = loaded.connections().unwrap();
        assert_eq!(
            connections.get("warehouse").and_then(Uri::host),
            Some("db")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (manager, _temp_dir) = temp_config_manager();
        manager.save(&Config::default()).unwrap();
        let mode = std::fs::metadata(manager.config_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(
            manager.config_path(),
            "schema_version = 1\n[defaults.timeout]\nconnect_ms = 250\n",
        )
        .unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.defaults.timeout.connect_ms, 250);
        assert_eq!(config.defaults.timeout.io_ms, 30000);
        assert_eq!(config.defaults.env_prefix, "URIO");
    }

    #[test]
    fn test_invalid_connection_uri() {
        let mut config = Config::default();
        config.connections.insert("BAD".into(), "no scheme".into());
        assert!(config.connections().is_err());
    }

    #[test]
    fn test_schema_version_too_new() {
        let (manager, _temp_dir) = temp_config_manager();

        let content = format!("schema_version = {}\n", SCHEMA_VERSION + 1);
        std::fs::write(manager.config_path(), content).unwrap();

        let result = manager.load();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("newer than supported")
        );
    }
}
