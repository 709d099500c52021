//! Configuration management for the collector
//!
//! All tunables live in an explicit [`Config`] passed into the store, the
//! session manager and the strategies; there is no module-level mutable
//! state. Values load from environment variables (`TGCOLLECT_*`) or a TOML
//! file, with defaults matching the behavior the collection pipeline was
//! tuned with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Link store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Browser session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Collection strategy configuration
    #[serde(default)]
    pub collect: CollectConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Link store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub path: PathBuf,
}

/// Browser session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the serialized session snapshot lives
    pub snapshot_path: PathBuf,

    /// Chrome remote-debugging port used by the login flow
    pub debug_port: u16,

    /// Persistent user-data directory for the login browser
    pub profile_dir: Option<PathBuf>,

    /// Override for the browser binary location
    pub browser_path: Option<PathBuf>,
}

/// Collection strategy configuration
///
/// The scroll loop counts and jitter bounds are pacing defaults, not
/// invariants; jitter only needs to be behavior-randomizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Pages fetched per run by the HTTP strategies
    pub max_pages: usize,

    /// Rate limit for HTTP strategies (requests per second)
    pub rate_limit: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum retry attempts for retryable HTTP statuses
    pub max_retries: u32,

    /// Scroll rounds per search URL
    pub scroll_rounds: u32,

    /// Scroll steps within one round
    pub scrolls_per_round: u32,

    /// Consecutive no-growth steps that end a round early
    pub stall_limit: u32,

    /// Jittered wait after each scroll step (seconds, min/max)
    pub scroll_wait_secs: (f64, f64),

    /// Jittered pause between search URLs (seconds, min/max)
    pub url_pause_secs: (f64, f64),

    /// Settle time after a page load before scanning
    pub initial_wait_secs: u64,

    /// Page navigation timeout in seconds
    pub page_load_timeout_secs: u64,

    /// Timeout waiting for post elements to render
    pub content_wait_timeout_secs: u64,

    /// Browser idle timeout in seconds
    pub idle_timeout_secs: u64,

    /// Randomized viewport width bounds
    pub viewport_width: (u32, u32),

    /// Randomized viewport height bounds
    pub viewport_height: (u32, u32),
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("telegram_links.db"),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("storage_state.json"),
            debug_port: 9222,
            profile_dir: None,
            browser_path: None,
        }
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_pages: 1,
            rate_limit: 1,
            request_timeout_secs: 15,
            max_retries: 2,
            scroll_rounds: 3,
            scrolls_per_round: 30,
            stall_limit: 3,
            scroll_wait_secs: (4.0, 8.0),
            url_pause_secs: (15.0, 20.0),
            initial_wait_secs: 5,
            page_load_timeout_secs: 30,
            content_wait_timeout_secs: 10,
            idle_timeout_secs: 300,
            viewport_width: (1200, 1920),
            viewport_height: (800, 1080),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, defaulting anything
    /// unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TGCOLLECT_DB_PATH") {
            config.database.path = path.into();
        }
        if let Ok(path) = std::env::var("TGCOLLECT_SNAPSHOT_PATH") {
            config.session.snapshot_path = path.into();
        }
        if let Ok(port) = std::env::var("TGCOLLECT_DEBUG_PORT") {
            config.session.debug_port = port
                .parse()
                .context("TGCOLLECT_DEBUG_PORT must be a port number")?;
        }
        if let Ok(path) = std::env::var("TGCOLLECT_BROWSER_PATH") {
            config.session.browser_path = Some(path.into());
        }
        if let Ok(rate) = std::env::var("TGCOLLECT_RATE_LIMIT") {
            config.collect.rate_limit = rate
                .parse()
                .context("TGCOLLECT_RATE_LIMIT must be an integer")?;
        }
        if let Ok(level) = std::env::var("TGCOLLECT_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("TGCOLLECT_LOG_FORMAT") {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&raw).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that would otherwise surface deep inside a run.
    pub fn validate(&self) -> Result<()> {
        if self.collect.rate_limit == 0 {
            anyhow::bail!("rate_limit must be at least 1");
        }
        if self.collect.scrolls_per_round == 0 || self.collect.scroll_rounds == 0 {
            anyhow::bail!("scroll_rounds and scrolls_per_round must be at least 1");
        }
        if self.collect.stall_limit == 0 {
            anyhow::bail!("stall_limit must be at least 1");
        }
        for (name, (min, max)) in [
            ("scroll_wait_secs", self.collect.scroll_wait_secs),
            ("url_pause_secs", self.collect.url_pause_secs),
        ] {
            if min < 0.0 || max < min {
                anyhow::bail!("{name} bounds must satisfy 0 <= min <= max");
            }
        }
        if self.session.debug_port == 0 {
            anyhow::bail!("debug_port must be non-zero");
        }
        Ok(())
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.collect.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.path, PathBuf::from("telegram_links.db"));
        assert_eq!(config.session.debug_port, 9222);
        assert_eq!(config.collect.scroll_rounds, 3);
        assert_eq!(config.collect.stall_limit, 3);
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let mut config = Config::default();
        config.collect.scrolls_per_round = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.collect.rate_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.debug_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_jitter() {
        let mut config = Config::default();
        config.collect.scroll_wait_secs = (8.0, 4.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tgcollect.toml");
        let config = Config::default();
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.collect.scrolls_per_round, config.collect.scrolls_per_round);
        assert_eq!(loaded.session.snapshot_path, config.session.snapshot_path);
    }

    #[test]
    fn test_from_file_partial_sections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tgcollect.toml");
        std::fs::write(
            &path,
            "[database]\npath = \"custom.db\"\n\n[collect]\nscroll_rounds = 5\n",
        )
        .unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.database.path, PathBuf::from("custom.db"));
        assert_eq!(loaded.collect.scroll_rounds, 5);
        // Everything omitted falls back to defaults
        assert_eq!(loaded.collect.scrolls_per_round, 30);
        assert_eq!(loaded.session.debug_port, 9222);
    }
}
