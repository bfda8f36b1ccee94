//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/spoilerscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/spoilerscope/` (~/.config/spoilerscope/)
//! - State/Logs: `$XDG_STATE_HOME/spoilerscope/` (~/.local/state/spoilerscope/)
//!
//! Only two knobs change analysis results: `analysis.fast_mode` and
//! `resolver.corridor`. Everything else is scheduling or observability.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Reveal extraction and dependency inference
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Anchor resolution
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Optional dependency enrichment collaborator
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analysis configuration
#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    /// Skip dependency inference and chain every reveal to all earlier ones
    #[serde(default)]
    pub fast_mode: bool,

    /// Number of scenes processed per extraction chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fast_mode: false,
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    25
}

/// Anchor resolver configuration
#[derive(Debug, Deserialize)]
pub struct ResolverConfig {
    /// Bytes searched on each side of a stale offset by tiers 2 and 3
    #[serde(default = "default_corridor")]
    pub corridor: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            corridor: default_corridor(),
        }
    }
}

/// Default resolver corridor in bytes.
pub const DEFAULT_CORRIDOR: usize = 1_500;

fn default_corridor() -> usize {
    DEFAULT_CORRIDOR
}

/// Dependency enrichment configuration
#[derive(Debug, Deserialize)]
pub struct EnrichmentConfig {
    /// Give up on the collaborator after this many milliseconds
    #[serde(default = "default_enrichment_timeout")]
    pub timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_enrichment_timeout(),
        }
    }
}

fn default_enrichment_timeout() -> u64 {
    5_000
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.resolver.corridor == 0 {
            return Err(Error::Config(
                "resolver.corridor must be greater than 0".to_string(),
            ));
        }
        if self.analysis.chunk_size == 0 {
            return Err(Error::Config(
                "analysis.chunk_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/spoilerscope/config.toml` (~/.config/spoilerscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("spoilerscope").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/spoilerscope/` (~/.local/state/spoilerscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("spoilerscope")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/spoilerscope/spoilerscope.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("spoilerscope.log")
    }

    /// Ensure XDG env vars are set, defaulting to `$HOME` based paths.
    ///
    /// Called by the CLI binaries before anything reads these vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.analysis.fast_mode);
        assert_eq!(config.analysis.chunk_size, 25);
        assert_eq!(config.resolver.corridor, 1_500);
        assert_eq!(config.enrichment.timeout_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[analysis]
fast_mode = true
chunk_size = 10

[resolver]
corridor = 400

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert!(config.analysis.fast_mode);
        assert_eq!(config.analysis.chunk_size, 10);
        assert_eq!(config.resolver.corridor, 400);
        assert_eq!(config.enrichment.timeout_ms, 5_000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_corridor_rejected() {
        let config: Config = toml::from_str("[resolver]\ncorridor = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[analysis]\nchunk_size = 0\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));

        std::fs::write(&path, "[analysis]\nchunk_size = 3\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.analysis.chunk_size, 3);
    }
}
