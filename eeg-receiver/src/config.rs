//! Receiver configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use eeg_core::ReconnectPolicy;
use eeg_core::limits::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_INTERVAL,
    DEFAULT_SAMPLING_RATE_HZ, SAMPLING_RATE_HZ, clamp_logged, clamp_port,
    clamp_reconnect_interval,
};

/// Top-level configuration for the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Generator to read frames from.
    pub network: NetworkConfig,
    /// Optional WebSocket re-publish target.
    pub websocket: WebSocketConfig,
    /// Retry behaviour shared by both links.
    pub reconnect: ReconnectConfig,
    /// Sample history kept for plotting.
    pub buffer: BufferConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u32,
    /// Per-attempt connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Seconds between attempts, at least 1.
    pub interval_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Samples kept per channel.
    pub capacity: usize,
    /// Used to build the time axis, 10 to 1000 Hz.
    pub sampling_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            websocket: WebSocketConfig::default(),
            reconnect: ReconnectConfig::default(),
            buffer: BufferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 50012,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".into(),
            port: 8765,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_RECONNECT_INTERVAL.as_secs_f64(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
            sampling_rate: DEFAULT_SAMPLING_RATE_HZ,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ReceiverConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Clamp every value into its allowed range. Each clamp is logged.
    pub fn validated(mut self) -> Self {
        self.network.port = u32::from(clamp_port("port", self.network.port));
        self.websocket.port = u32::from(clamp_port("websocket.port", self.websocket.port));
        if self.network.connect_timeout_ms == 0 {
            warn!("connect_timeout_ms = 0 is not allowed, using the default");
            self.network.connect_timeout_ms = DEFAULT_CONNECT_TIMEOUT.as_millis() as u64;
        }
        self.reconnect.interval_secs =
            clamp_reconnect_interval(self.reconnect.interval_secs).as_secs_f64();
        if self.buffer.capacity == 0 {
            warn!("buffer capacity 0 is not allowed, using {DEFAULT_BUFFER_CAPACITY}");
            self.buffer.capacity = DEFAULT_BUFFER_CAPACITY;
        }
        self.buffer.sampling_rate =
            clamp_logged("sampling_rate", self.buffer.sampling_rate, SAMPLING_RATE_HZ);
        self
    }

    pub fn port(&self) -> u16 {
        clamp_port("port", self.network.port)
    }

    pub fn websocket_port(&self) -> u16 {
        clamp_port("websocket.port", self.websocket.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.connect_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.reconnect.enabled, self.reconnect.interval_secs)
    }
}

// ── Tests ────────────────────────────────────────────────────────
