//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; anything left out falls back to the
//! built-in defaults, which describe the standard local setup.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, ViewerError};
use crate::live::{LiveSettings, ReconnectPolicy};
use crate::view::project::DisplayCap;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Historical data endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_base_url")]
    pub base_url: String,

    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: u32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Reconnect delay schedule
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Live feed connection
#[derive(Debug, Deserialize, Clone)]
pub struct LiveConfig {
    #[serde(default = "default_live_url")]
    pub url: String,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff: Backoff,

    #[serde(default = "default_max_reconnect_interval_ms")]
    pub max_reconnect_interval_ms: u64,

    #[serde(default = "default_resubscribe_suppressed")]
    pub resubscribe_suppressed: bool,
}

/// Table view
#[derive(Debug, Deserialize, Clone)]
pub struct ViewConfig {
    #[serde(default = "default_display_cap")]
    pub display_cap: usize,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_ascending")]
    pub ascending: bool,

    #[serde(default = "default_clear_screen")]
    pub clear_screen: bool,
}

/// Tracked telemetry channels
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelsConfig {
    #[serde(default = "default_tracked")]
    pub tracked: Vec<String>,
}

/// Log output and incident retention
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_incident_capacity")]
    pub incident_capacity: usize,
}

// Default value functions
fn default_history_base_url() -> String { "http://localhost:8080/history".to_string() }
fn default_lookback_minutes() -> u32 { 15 }
fn default_request_timeout_ms() -> u64 { 10000 }

fn default_live_url() -> String { "ws://localhost:8080/realtime".to_string() }
fn default_reconnect_interval_ms() -> u64 { 1000 }
fn default_backoff() -> Backoff { Backoff::Fixed }
fn default_max_reconnect_interval_ms() -> u64 { 30000 }
fn default_resubscribe_suppressed() -> bool { true }

fn default_display_cap() -> usize { 1000 }
fn default_page_size() -> usize { 1000 }
fn default_ascending() -> bool { true }
fn default_clear_screen() -> bool { true }

fn default_tracked() -> Vec<String> { vec!["pwr.v".to_string(), "pwr.c".to_string()] }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_incident_capacity() -> usize { 64 }

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_history_base_url(),
            lookback_minutes: default_lookback_minutes(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: default_live_url(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            backoff: default_backoff(),
            max_reconnect_interval_ms: default_max_reconnect_interval_ms(),
            resubscribe_suppressed: default_resubscribe_suppressed(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            display_cap: default_display_cap(),
            page_size: default_page_size(),
            ascending: default_ascending(),
            clear_screen: default_clear_screen(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self { tracked: default_tracked() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
            incident_capacity: default_incident_capacity(),
        }
    }
}

impl HistoryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl LiveConfig {
    /// Reconnect schedule described by this section
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let initial = Duration::from_millis(self.reconnect_interval_ms);
        match self.backoff {
            Backoff::Fixed => ReconnectPolicy::Fixed(initial),
            Backoff::Exponential => ReconnectPolicy::Exponential {
                initial,
                max: Duration::from_millis(self.max_reconnect_interval_ms),
            },
        }
    }

    /// Connection settings for the given tracked channels
    pub fn settings(&self, tracked: &[String]) -> LiveSettings {
        LiveSettings {
            url: self.url.clone(),
            tracked: tracked.to_vec(),
            policy: self.reconnect_policy(),
            resubscribe_suppressed: self.resubscribe_suppressed,
        }
    }
}

impl ViewConfig {
    pub fn display_cap(&self) -> DisplayCap {
        DisplayCap::new(self.display_cap, self.page_size)
    }
}

fn invalid(message: impl std::fmt::Display) -> ViewerError {
    ViewerError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_viewer::config::Config;
    ///
    /// let config = Config::load("config/viewer.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let base_url = &self.history.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(invalid("history base_url must start with http:// or https://"));
        }

        if self.history.lookback_minutes == 0 || self.history.lookback_minutes > 10080 {
            return Err(invalid("lookback_minutes must be between 1 and 10080"));
        }

        if self.history.request_timeout_ms == 0 || self.history.request_timeout_ms > 60000 {
            return Err(invalid("request_timeout_ms must be between 1 and 60000"));
        }

        let url = &self.live.url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(invalid("live url must start with ws:// or wss://"));
        }

        if self.live.reconnect_interval_ms == 0 || self.live.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.live.backoff == Backoff::Exponential
            && self.live.max_reconnect_interval_ms < self.live.reconnect_interval_ms
        {
            return Err(invalid(
                "max_reconnect_interval_ms must not be below reconnect_interval_ms",
            ));
        }

        if self.view.display_cap == 0 {
            return Err(invalid("display_cap must be greater than 0"));
        }

        if self.view.page_size == 0 {
            return Err(invalid("page_size must be greater than 0"));
        }

        // Channel names travel inside space-separated directives
        if self.channels.tracked.is_empty() {
            return Err(invalid("at least one tracked channel is required"));
        }
        for (idx, channel) in self.channels.tracked.iter().enumerate() {
            if channel.is_empty() || channel.chars().any(char::is_whitespace) {
                return Err(invalid(format!(
                    "channel name '{}' must be non-empty and contain no whitespace",
                    channel
                )));
            }
            if self.channels.tracked[..idx].contains(channel) {
                return Err(invalid(format!("channel '{}' is listed twice", channel)));
            }
        }

        if self.logging.dir.is_empty() {
            return Err(invalid("logging dir cannot be empty"));
        }

        if self.logging.incident_capacity == 0 {
            return Err(invalid("incident_capacity must be greater than 0"));
        }

        Ok(())
    }
}
