//! Link configuration
//!
//! Stored as pretty-printed JSON. Every field has a default, so a partial
//! (or empty) file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::demo::SimulatedConnector;
use crate::protocol::{
    Connector, SerialConnector, TcpConnector, DEFAULT_BAUD_RATE, DEFAULT_DEVICE_NAME,
    DEFAULT_READ_TIMEOUT_MS,
};
use crate::session::DEFAULT_EVENT_CAPACITY;
use crate::telemetry::{AlertSettings, PollerConfig};

const CONFIG_FILE_NAME: &str = "link.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How to reach the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Bluetooth serial port; scanned for when `port` is unset
    Serial {
        #[serde(default)]
        port: Option<String>,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// Serial-over-TCP bridge at `host:port`
    Tcp { address: String },
    /// Built-in simulated smoker
    Simulated,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Serial {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Alert thresholds as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub cooldown_secs: u64,
    pub over_temp_margin_c: f32,
    pub cook_tolerance_c: f32,
    pub low_fuel_margin_c: f32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        let settings = AlertSettings::default();
        Self {
            cooldown_secs: settings.cooldown.as_secs(),
            over_temp_margin_c: settings.over_temp_margin_c,
            cook_tolerance_c: settings.cook_tolerance_c,
            low_fuel_margin_c: settings.low_fuel_margin_c,
        }
    }
}

impl From<&AlertConfig> for AlertSettings {
    fn from(config: &AlertConfig) -> Self {
        AlertSettings {
            over_temp_margin_c: config.over_temp_margin_c,
            cook_tolerance_c: config.cook_tolerance_c,
            low_fuel_margin_c: config.low_fuel_margin_c,
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

/// Link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Name the controller advertises
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Transport read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Telemetry poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub alerts: AlertConfig,

    /// Consecutive read failures before the link is marked failed
    #[serde(default = "default_max_read_failures")]
    pub max_read_failures: u32,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_read_failures() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval_secs() -> u64 {
    5
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            transport: TransportConfig::default(),
            read_timeout_ms: default_read_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            alerts: AlertConfig::default(),
            max_read_failures: default_max_read_failures(),
            auto_reconnect: default_true(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl LinkConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: LinkConfig = serde_json::from_str(&content)?;
        config.validate()?;
        debug!("loaded link config from {:?}", path);
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Default config location, e.g. `~/.config/pitlink/link.json`
    pub fn default_path() -> io::Result<PathBuf> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "Could not find config directory")
            })?;
        Ok(base.join("pitlink").join(CONFIG_FILE_NAME))
    }

    /// Load from [`default_path`](Self::default_path), falling back to defaults
    ///
    /// A missing file is normal; an unreadable one is logged and ignored.
    pub fn load_or_default() -> Self {
        let Ok(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring config at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be greater than 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be greater than 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be greater than 0".into()));
        }
        if self.max_read_failures == 0 {
            return Err(ConfigError::Invalid("max_read_failures must be greater than 0".into()));
        }
        if self.alerts.cook_tolerance_c < 0.0 {
            return Err(ConfigError::Invalid("cook_tolerance_c cannot be negative".into()));
        }
        if let TransportConfig::Tcp { address } = &self.transport {
            if address.is_empty() {
                return Err(ConfigError::Invalid("tcp transport needs an address".into()));
            }
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_read_failures: self.max_read_failures,
            auto_reconnect: self.auto_reconnect,
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
            alerts: AlertSettings::from(&self.alerts),
        }
    }

    /// Build the connector described by `transport`
    pub fn connector(&self) -> Arc<dyn Connector> {
        match &self.transport {
            TransportConfig::Serial { port, baud_rate } => {
                let mut connector = SerialConnector::new(self.device_name.clone())
                    .with_baud_rate(*baud_rate)
                    .with_read_timeout(self.read_timeout());
                if let Some(port) = port {
                    connector = connector.with_port(port.clone());
                }
                Arc::new(connector)
            }
            TransportConfig::Tcp { address } => Arc::new(TcpConnector::new(
                self.device_name.clone(),
                address.clone(),
                self.read_timeout(),
            )),
            TransportConfig::Simulated => Arc::new(SimulatedConnector::new()),
        }
    }
}
