//! ==============================================================================
//! config.rs - sync daemon configuration loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `sync.toml`, overlays `DISPLAYSYNC_*` environment
//!     variables on top, and resolves the result into typed `SyncSettings`.
//!
//! structure:
//!     - FeedConfig: telemetry feed url and request timeout.
//!     - PollingConfig: how often a sync cycle runs.
//!     - StateConfig: where the cursor file lives.
//!     - LedgerConfig: gateway url, keypair, device hints, auto-register flag.
//!     - StatusConfig: optional listen address for the status endpoint.
//!     - LoggingConfig: default log level.
//!
//! a missing or broken config file is never fatal; a value that cannot be
//! resolved (bad feed url, bad identity, zero interval) always is.
//!
//! ==============================================================================

use crate::identity::Identity;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "DISPLAYSYNC_";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 120_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("feed url is not configured (set DISPLAYSYNC_FEED_URL)")]
    MissingFeedUrl,
    #[error("cannot derive channel id from feed url {0:?}: expected a channels/<digits>/ segment")]
    ChannelId(String),
    #[error("ledger url is not configured (set DISPLAYSYNC_LEDGER_URL)")]
    MissingLedgerUrl,
    #[error("keypair path is not configured (set DISPLAYSYNC_KEYPAIR_PATH)")]
    MissingKeypair,
    #[error("invalid {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub keypair_path: Option<PathBuf>,
    #[serde(default)]
    pub device_index: Option<String>,
    #[serde(default)]
    pub device_authority: Option<String>,
    #[serde(default)]
    pub recorder_authority: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_true")]
    pub auto_register: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StatusConfig {
    #[serde(default)]
    pub listen: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_request_timeout_ms() -> u64 { DEFAULT_REQUEST_TIMEOUT_MS }
fn default_poll_interval_ms() -> u64 { DEFAULT_POLL_INTERVAL_MS }
fn default_state_path() -> PathBuf { PathBuf::from("data").join("sync-state.json") }
fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }

impl Default for FeedConfig {
    fn default() -> Self {
        Self { url: None, request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: DEFAULT_POLL_INTERVAL_MS }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { path: default_state_path() }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: None,
            keypair_path: None,
            device_index: None,
            device_authority: None,
            recorder_authority: None,
            location: None,
            auto_register: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Hints the resolver uses to find (or create) the device this process reports for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceHints {
    pub device_index: Option<u64>,
    pub device_authority: Option<Identity>,
    pub recorder_authority: Option<Identity>,
    pub location: Option<String>,
}

/// Fully validated settings; everything the binaries need to start.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub feed_url: String,
    pub channel_id: u64,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub state_path: PathBuf,
    pub ledger_url: String,
    pub keypair_path: PathBuf,
    pub hints: DeviceHints,
    pub auto_register: bool,
    pub status_listen: Option<SocketAddr>,
}

impl SyncConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: SyncConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback. runs before logging is initialised, so it prints.
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("sync.toml"),
            PathBuf::from("..").join("config").join("sync.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] No config file found - using defaults and environment");
        Self::default()
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// overlay `DISPLAYSYNC_*` values from `lookup`. empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("FEED_URL") {
            self.feed.url = Some(v);
        }
        if let Some(v) = get("REQUEST_TIMEOUT_MS") {
            match v.parse() {
                Ok(ms) => self.feed.request_timeout_ms = ms,
                Err(_) => println!("[CONFIG] Warning: ignoring unparsable REQUEST_TIMEOUT_MS={}", v),
            }
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            match v.parse() {
                Ok(ms) => self.polling.interval_ms = ms,
                Err(_) => println!("[CONFIG] Warning: ignoring unparsable POLL_INTERVAL_MS={}", v),
            }
        }
        if let Some(v) = get("STATE_FILE") {
            self.state.path = PathBuf::from(v);
        }
        if let Some(v) = get("LEDGER_URL") {
            self.ledger.url = Some(v);
        }
        if let Some(v) = get("KEYPAIR_PATH") {
            self.ledger.keypair_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DEVICE_INDEX") {
            self.ledger.device_index = Some(v);
        }
        if let Some(v) = get("DEVICE_AUTHORITY") {
            self.ledger.device_authority = Some(v);
        }
        if let Some(v) = get("RECORDER_AUTHORITY") {
            self.ledger.recorder_authority = Some(v);
        }
        if let Some(v) = get("LOCATION") {
            self.ledger.location = Some(v);
        }
        if let Some(v) = get("AUTO_REGISTER") {
            match parse_flag(&v) {
                Some(flag) => self.ledger.auto_register = flag,
                None => println!("[CONFIG] Warning: ignoring unparsable AUTO_REGISTER={}", v),
            }
        }
        if let Some(v) = get("STATUS_LISTEN") {
            self.status.listen = Some(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Validate and type every value the daemon needs.
    pub fn resolve(&self) -> Result<SyncSettings, ConfigError> {
        let feed_url = self.feed.url.clone().ok_or(ConfigError::MissingFeedUrl)?;
        let channel_id = channel_id_from_url(&feed_url)?;

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Zero { field: "poll interval" });
        }
        if self.feed.request_timeout_ms == 0 {
            return Err(ConfigError::Zero { field: "request timeout" });
        }

        let ledger_url = self.ledger.url.clone().ok_or(ConfigError::MissingLedgerUrl)?;
        let keypair_path = self.ledger.keypair_path.clone().ok_or(ConfigError::MissingKeypair)?;

        let device_index = self
            .ledger
            .device_index
            .as_deref()
            .map(|v| {
                v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    field: "device index",
                    value: v.to_string(),
                })
            })
            .transpose()?;

        let status_listen = self
            .status
            .listen
            .as_deref()
            .map(|v| {
                v.parse::<SocketAddr>().map_err(|_| ConfigError::InvalidValue {
                    field: "status listen address",
                    value: v.to_string(),
                })
            })
            .transpose()?;

        Ok(SyncSettings {
            feed_url,
            channel_id,
            poll_interval: Duration::from_millis(self.polling.interval_ms),
            request_timeout: Duration::from_millis(self.feed.request_timeout_ms),
            state_path: self.state.path.clone(),
            ledger_url,
            keypair_path,
            hints: DeviceHints {
                device_index,
                device_authority: parse_identity("device authority", self.ledger.device_authority.as_deref())?,
                recorder_authority: parse_identity("recorder authority", self.ledger.recorder_authority.as_deref())?,
                location: self.ledger.location.clone().filter(|l| !l.trim().is_empty()),
            },
            auto_register: self.ledger.auto_register,
            status_listen,
        })
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          SYNC CONFIGURATION             │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Feed: {}", self.feed.url.as_deref().unwrap_or("<unset>"));
        println!("│ Ledger: {}", self.ledger.url.as_deref().unwrap_or("<unset>"));
        println!("│ Poll Interval: {}ms", self.polling.interval_ms);
        println!("│ State File: {}", self.state.path.display());
        println!("│ Auto Register: {}", self.ledger.auto_register);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

/// Derive the numeric feed channel from a url containing `channels/<digits>/`.
pub fn channel_id_from_url(url: &str) -> Result<u64, ConfigError> {
    let err = || ConfigError::ChannelId(url.to_string());
    let (_, rest) = url.split_once("channels/").ok_or_else(err)?;
    let (digits, _) = rest.split_once('/').ok_or_else(err)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    digits.parse().map_err(|_| err())
}

fn parse_identity(field: &'static str, raw: Option<&str>) -> Result<Option<Identity>, ConfigError> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<Identity>()
                .map_err(|_| ConfigError::InvalidValue { field, value: v.to_string() })
        })
        .transpose()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
