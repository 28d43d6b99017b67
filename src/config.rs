//! modemscout.toml loading
//!
//! This module handles loading configuration from TOML files with
//! environment overrides (`MODEMSCOUT__HTTP__TIMEOUT=20`). Every section has
//! defaults, so running without a config file works.

use anyhow::{Context, Result};
use config::{Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "MODEMSCOUT";
const ENV_SEPARATOR: &str = "__";

/// Config file layout; every section is optional
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Watch-mode settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Timeouts and retries for modem requests
    #[serde(default)]
    pub http: HttpConfig,

    /// Detection budget
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Log filter and destination
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Modems to poll
    #[serde(default)]
    pub modems: Vec<ModemConfig>,
}

/// Global watch-mode settings
#[derive(Debug, Deserialize, Clone)]
pub struct GlobalConfig {
    /// Poll interval in seconds for watch mode
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
        }
    }
}

/// Configuration for a single modem
#[derive(Debug, Deserialize, Clone)]
pub struct ModemConfig {
    /// Human-readable name for this modem
    pub name: String,

    /// Address: `192.168.100.1`, `host:port` or a full URL
    pub host: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Parser name from a previous successful detection
    #[serde(default)]
    pub parser: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Parser trials before the circuit breaker trips
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock budget in seconds for one detection run
    #[serde(default = "default_max_duration")]
    pub max_duration: u64,
}

impl DiscoveryConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_duration: default_max_duration(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub log_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: String::new(),
        }
    }
}

// serde defaults
fn default_check_interval() -> u64 {
    300
}

fn default_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    15
}

fn default_max_duration() -> u64 {
    90
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from an explicit path, the standard locations, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.exists()),
        };

        let mut builder = config::Config::builder();
        match &path {
            Some(p) => {
                tracing::debug!("Loading config from: {}", p.display());
                builder = builder.add_source(File::from(p.as_path()).required(explicit.is_some()));
            }
            None => tracing::debug!("No config file found, using defaults"),
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to read config file")?
            .try_deserialize()
            .context("Failed to parse config file")
    }

    /// Parse a TOML document directly
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("modemscout.toml"),
            PathBuf::from("/etc/modemscout/config.toml"),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config/modemscout/config.toml"));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.discovery.max_attempts, 15);
        assert_eq!(cfg.discovery.max_duration(), Duration::from_secs(90));
        assert_eq!(cfg.http.timeout, 10);
        assert!(cfg.modems.is_empty());
    }

    #[test]
    fn test_parse_modem_entries() {
        let cfg = Config::from_toml_str(
            r#"
            [discovery]
            max_attempts = 5

            [[modems]]
            name = "basement"
            host = "192.168.100.1"
            username = "admin"
            password = "motorola"
            parser = "motorola_mb8611"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.discovery.max_attempts, 5);
        assert_eq!(cfg.discovery.max_duration, 90);
        assert_eq!(cfg.modems.len(), 1);
        assert_eq!(cfg.modems[0].parser.as_deref(), Some("motorola_mb8611"));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("modemscout.toml");
        fs::write(
            &path,
            r#"
            [http]
            timeout = 20

            [[modems]]
            name = "office"
            host = "10.0.0.1"
            "#,
        )
        .unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.http.timeout, 20);
        assert_eq!(cfg.http.connect_timeout, 5);
        assert_eq!(cfg.modems[0].username, "");
        assert!(cfg.modems[0].parser.is_none());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
