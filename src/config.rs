//! Configuration management for hwtally
//!
//! Controls where raw counters are read from, how long external queries may
//! run, and which identity sources are consulted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// hwtally configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Polling and query options
    #[serde(default)]
    pub general: GeneralConfig,
    /// Filesystem locations of raw counter sources
    #[serde(default)]
    pub paths: PathsConfig,
    /// Disk enumeration options
    #[serde(default)]
    pub disk: DiskConfig,
    /// Processor identity options
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// General polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Interval between disk counter polls in milliseconds (CLI `poll`)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound for a single system tool run (dmidecode, cpuid)
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
}

/// Raw source locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Prefix prepended to `/proc`, `/sys` and `/dev` reads
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

/// Disk enumeration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Block device name prefixes that are never reported as disks
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

/// Processor identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Consult privileged tools (dmidecode, cpuid) before synthesizing an ID
    #[serde(default = "default_true")]
    pub use_privileged_tools: bool,
    /// dmidecode executable
    #[serde(default = "default_dmidecode")]
    pub dmidecode: String,
    /// cpuid executable
    #[serde(default = "default_cpuid")]
    pub cpuid: String,
}

// Default value functions
fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_query_timeout() -> u64 {
    5000
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_skip_prefixes() -> Vec<String> {
    vec!["loop".to_string(), "ram".to_string(), "dm-".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_dmidecode() -> String {
    "dmidecode".to_string()
}

fn default_cpuid() -> String {
    "cpuid".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            query_timeout_ms: default_query_timeout(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            use_privileged_tools: true,
            dmidecode: default_dmidecode(),
            cpuid: default_cpuid(),
        }
    }
}

impl GeneralConfig {
    /// Query timeout as a [`Duration`]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Get the default configuration directory
    ///
    /// Returns `~/.config/hwtally` on Unix-like systems,
    /// or `%APPDATA%\hwtally` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        };

        Ok(config_dir.join("hwtally"))
    }

    /// Load configuration from the default path, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_file = Self::default_path()?.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.general.query_timeout_ms == 0 {
            return Err(Error::ConfigError(
                "general.query_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.general.poll_interval_ms == 0 {
            return Err(Error::ConfigError(
                "general.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.poll_interval_ms, 1000);
        assert_eq!(config.general.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.paths.root, PathBuf::from("/"));
        assert!(config.identity.use_privileged_tools);
        assert!(config.disk.skip_prefixes.iter().any(|p| p == "loop"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[identity]\nuse_privileged_tools = false\n").unwrap();
        assert!(!config.identity.use_privileged_tools);
        assert_eq!(config.identity.dmidecode, "dmidecode");
        assert_eq!(config.general.query_timeout_ms, 5000);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.paths.root = PathBuf::from("/host");
        config.general.query_timeout_ms = 250;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.paths.root, PathBuf::from("/host"));
        assert_eq!(loaded.general.query_timeout_ms, 250);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nquery_timeout_ms = 0\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(Error::ConfigError(_))
        ));
    }
}
