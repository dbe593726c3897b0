//! Configuration management for LanSync
//!
//! This module handles loading, validating, and managing configuration
//! for the LanSync service.

use crate::discovery::types::{
    default_instance_name, default_txt, AdvertisedService, DEFAULT_PORT, DEFAULT_SERVICE_TYPE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest debounce window accepted
const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// What we announce on the local network
    #[serde(default)]
    pub service: ServiceConfig,

    /// Handshake server configuration
    #[serde(default)]
    pub handshake: HandshakeConfig,

    /// Orchestrator configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Sandboxed file access configuration
    #[serde(default)]
    pub files: FilesConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Advertisement and browse configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// DNS-SD service type, browsed and announced
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Instance name (generated if not specified)
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port carried in the announcement
    #[serde(default = "default_port")]
    pub port: u16,

    /// TXT records
    #[serde(default = "default_txt")]
    pub txt: BTreeMap<String, String>,
}

/// Handshake server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Address the server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port the server listens on
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a submitted event is handled
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Sandboxed file access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Private root every file path is resolved against
    #[serde(default = "default_files_root")]
    pub root: PathBuf,
}

// Default value functions
fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_files_root() -> PathBuf {
    PathBuf::from("~/.local/share/lansync/files")
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            instance_name: default_instance_name(),
            port: default_port(),
            txt: default_txt(),
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: default_files_root(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            handshake: HandshakeConfig::default(),
            sync: SyncConfig::default(),
            files: FilesConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Checks in order:
    /// 1. Path from LANSYNC_CONFIG environment variable
    /// 2. ~/.config/lansync/config.toml
    /// 3. Falls back to defaults if none exists
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = Self::find_config_path() {
            Self::load_from_path(&path)
        } else {
            let mut config = Self::default();
            config.expand_paths();
            Ok(config)
        }
    }

    /// Load configuration with optional custom path
    pub fn load_config(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::load_from_path(&path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml_str)?;
        config.expand_paths();
        config.validate_config()?;
        Ok(config)
    }

    /// Path of the config file in the user's config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lansync").join("config.toml"))
    }

    /// Find configuration file path
    fn find_config_path() -> Option<PathBuf> {
        // Check environment variable first
        if let Ok(path) = std::env::var("LANSYNC_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        Self::default_path().filter(|p| p.exists())
    }

    /// Expand tilde in paths
    fn expand_paths(&mut self) {
        self.files.root = expand_path(&self.files.root);
    }

    /// Validate configuration values
    fn validate_config(&self) -> Result<(), ConfigError> {
        let service_type = self.service.service_type.trim_end_matches('.');
        let service_type = service_type.strip_suffix(".local").unwrap_or(service_type);
        let labels: Vec<&str> = service_type.split('.').collect();
        let valid_type = labels.len() == 2
            && labels[0].len() > 1
            && labels[0].starts_with('_')
            && matches!(labels[1], "_tcp" | "_udp");
        if !valid_type {
            return Err(ConfigError::Validation(format!(
                "service_type must look like _name._tcp or _name._udp, got {:?}",
                self.service.service_type
            )));
        }

        if self.service.instance_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "instance_name must not be empty".to_string(),
            ));
        }

        if self.service.port == 0 {
            return Err(ConfigError::Validation(
                "service.port must not be 0".to_string(),
            ));
        }

        if self.sync.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "debounce_ms must not exceed {}",
                MAX_DEBOUNCE_MS
            )));
        }

        Ok(())
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let config_path = Self::default_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not find config directory",
            ))
        })?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate configuration file at given path
    pub fn validate(path: &Path) -> Result<(), ConfigError> {
        Self::load_from_path(path).map(|_| ())
    }

    /// Write an example configuration to the default location
    pub fn generate_example_config(force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = Self::default_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not find config directory",
            ))
        })?;

        if !force && config_path.exists() {
            return Err(ConfigError::Validation(
                "Config file already exists. Use --force to overwrite.".to_string(),
            ));
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, Self::generate_example())?;
        Ok(config_path)
    }

    /// Generate example configuration file
    pub fn generate_example() -> String {
        let config = Config::default();
        let txt = config
            .service
            .txt
            .iter()
            .map(|(k, v)| format!("{} = \"{}\"", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"# LanSync Configuration File
# Location: ~/.config/lansync/config.toml

# Logging level (trace, debug, info, warn, error)
log_level = "{}"

# What we announce and browse for
[service]
service_type = "{}"
# Omit to get a fresh rust-<uuid> name on every start
# instance_name = "my-laptop"
port = {}

# TXT records carried in the announcement
[service.txt]
{}

# Handshake server
[handshake]
bind_addr = "{}"
port = {}

# Event intake
[sync]
# Events closer together than this are coalesced to the last one
debounce_ms = {}

# Sandboxed file access
[files]
root = "{}"
"#,
            config.log_level,
            config.service.service_type,
            config.service.port,
            txt,
            config.handshake.bind_addr,
            config.handshake.port,
            config.sync.debounce_ms,
            config.files.root.display(),
        )
    }

    /// Debounce window as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.sync.debounce_ms)
    }

    /// Service description handed to the advertiser
    pub fn advertised_service(&self) -> AdvertisedService {
        AdvertisedService {
            service_type: self.service.service_type.clone(),
            instance_name: self.service.instance_name.clone(),
            port: self.service.port,
            txt: self.service.txt.clone(),
        }
    }
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.service_type, "_http._tcp");
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.handshake.port, 8080);
        assert_eq!(config.sync.debounce_ms, 1000);
        assert!(config.service.instance_name.starts_with("rust-"));
        assert_eq!(config.service.txt.len(), 2);
    }

    #[test]
    fn test_load_from_toml() {
        let toml_str = r#"
            log_level = "debug"

            [service]
            service_type = "_lansync._tcp"
            instance_name = "test-machine"
            port = 9000

            [sync]
            debounce_ms = 250
        "#;

        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.service.service_type, "_lansync._tcp");
        assert_eq!(config.service.instance_name, "test-machine");
        assert_eq!(config.service.port, 9000);
        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.log_level, "debug");
        // Untouched sections keep their defaults
        assert_eq!(config.handshake.port, 8080);
    }

    #[test]
    fn test_validation_service_type() {
        let toml_str = r#"
            [service]
            service_type = "http"
        "#;
        assert!(matches!(
            Config::from_toml(toml_str),
            Err(ConfigError::Validation(_))
        ));

        let toml_str = r#"
            [service]
            service_type = "_http._tcp.local."
        "#;
        assert!(Config::from_toml(toml_str).is_ok());
    }

    #[test]
    fn test_validation_port() {
        let toml_str = r#"
            [service]
            port = 0
        "#;
        assert!(Config::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_validation_debounce() {
        let toml_str = r#"
            [sync]
            debounce_ms = 120000
        "#;
        assert!(Config::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_files_root_tilde_expanded() {
        let toml_str = r#"
            [files]
            root = "~/lansync-files"
        "#;
        let config = Config::from_toml(toml_str).unwrap();
        assert!(!config.files.root.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config::default();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(config.service.instance_name, loaded.service.instance_name);
        assert_eq!(config.service.txt, loaded.service.txt);
        assert!(Config::validate(&path).is_ok());
    }

    #[test]
    fn test_generate_example() {
        let example = Config::generate_example();
        assert!(example.contains("LanSync Configuration"));
        assert!(example.contains("debounce_ms = 1000"));

        let parsed = Config::from_toml(&example).unwrap();
        assert_eq!(parsed.service.port, 8080);
        assert_eq!(parsed.service.txt.get("key1").map(String::as_str), Some("value1"));
    }
}
