//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/mixpanel-relay/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/mixpanel-relay/` (~/.config/mixpanel-relay/)
//! - State/Logs: `$XDG_STATE_HOME/mixpanel-relay/` (~/.local/state/mixpanel-relay/)
//!
//! A config value is captured by a tracker when it is built. Changing the file
//! only affects trackers built afterwards.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

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
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Retry and timeout settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote tracking API configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// Project token injected into every event that does not carry one
    #[serde(default)]
    pub token: String,

    /// API host, optionally with scheme (`http://` is assumed otherwise)
    #[serde(default = "default_server")]
    pub server: String,

    /// Path for standard and funnel events. Mind the slashes.
    #[serde(default = "default_tracking_endpoint")]
    pub tracking_endpoint: String,

    /// Path for profile operations
    #[serde(default = "default_people_endpoint")]
    pub people_endpoint: String,

    /// Query parameter carrying the encoded envelope
    #[serde(default = "default_data_variable")]
    pub data_variable: String,

    /// Query parameter carrying the test-mode marker
    #[serde(default = "default_test_variable")]
    pub test_variable: String,

    /// Event name used for funnel steps
    #[serde(default = "default_funnel_event_id")]
    pub funnel_event_id: String,

    /// Send events in test mode unless a call overrides it
    #[serde(default)]
    pub test_mode: bool,

    /// Kill-switch: when set nothing is sent and nothing is retried
    #[serde(default)]
    pub disabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            server: default_server(),
            tracking_endpoint: default_tracking_endpoint(),
            people_endpoint: default_people_endpoint(),
            data_variable: default_data_variable(),
            test_variable: default_test_variable(),
            funnel_event_id: default_funnel_event_id(),
            test_mode: false,
            disabled: false,
        }
    }
}

fn default_server() -> String {
    "api.mixpanel.com".to_string()
}

fn default_tracking_endpoint() -> String {
    "/track/".to_string()
}

fn default_people_endpoint() -> String {
    "/engage/".to_string()
}

fn default_data_variable() -> String {
    "data".to_string()
}

fn default_test_variable() -> String {
    "test".to_string()
}

fn default_funnel_event_id() -> String {
    "mp_funnel".to_string()
}

impl ApiConfig {
    /// Base URL with scheme and without a trailing slash
    pub fn base_url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("http://{}", server)
        }
    }
}

/// Retry policy and network timeout
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeliveryConfig {
    /// Retries after the first attempt before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Connect and request timeout, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            timeout_secs: default_timeout(),
        }
    }
}

impl DeliveryConfig {
    /// Delay between attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Network timeout for a single attempt
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    60
}

fn default_timeout() -> u64 {
    5
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
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
        let api = &self.api;
        if api.server.trim().is_empty() {
            return Err(Error::Config("api.server must not be empty".to_string()));
        }
        for (name, endpoint) in [
            ("api.tracking_endpoint", &api.tracking_endpoint),
            ("api.people_endpoint", &api.people_endpoint),
        ] {
            if !endpoint.starts_with('/') {
                return Err(Error::Config(format!("{} must start with '/'", name)));
            }
        }
        if api.data_variable.is_empty() || api.test_variable.is_empty() {
            return Err(Error::Config(
                "api.data_variable and api.test_variable must not be empty".to_string(),
            ));
        }
        if self.delivery.timeout_secs == 0 {
            return Err(Error::Config(
                "delivery.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/mixpanel-relay/config.toml` (~/.config/mixpanel-relay/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("mixpanel-relay").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/mixpanel-relay/` (~/.local/state/mixpanel-relay/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("mixpanel-relay")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("mixpanel-relay.log")
    }
}
