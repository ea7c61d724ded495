//! Configuration for the generator service.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use eeg_core::limits::{
    AMPLITUDE_UV, DEFAULT_SAMPLING_RATE_HZ, FREQUENCY_HZ, PLAYBACK_SPEED, SAMPLING_RATE_HZ,
    clamp_logged, clamp_port,
};
use eeg_core::source::{DEFAULT_AMPLITUDE_UV, DEFAULT_FREQUENCY_HZ};
use eeg_core::CHANNEL_COUNT;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Listening socket settings.
    pub network: NetworkConfig,
    /// What to generate and how fast.
    pub signal: SignalConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port, clamped to 1..=65535.
    pub port: u32,
    /// Concurrent receivers admitted before new ones are rejected.
    pub max_clients: usize,
}

/// Which source feeds the broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Synthetic,
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub mode: SourceMode,
    /// Samples per second, 10 to 1000.
    pub sampling_rate: f64,
    /// CSV table used in replay mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Replay speed multiplier, 0.5 to 5.0.
    pub playback_speed: f64,
    /// Synthetic waveform parameters, one entry per channel.
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub frequency_hz: f64,
    pub amplitude_uv: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            signal: SignalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 50012,
            max_clients: 5,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Synthetic,
            sampling_rate: DEFAULT_SAMPLING_RATE_HZ,
            file: None,
            playback_speed: 1.0,
            channels: vec![ChannelConfig::default(); CHANNEL_COUNT],
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            amplitude_uv: DEFAULT_AMPLITUDE_UV,
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

impl GeneratorConfig {
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
        if self.network.max_clients == 0 {
            warn!("max_clients = 0 is not allowed, using 1");
            self.network.max_clients = 1;
        }

        let signal = &mut self.signal;
        signal.sampling_rate = clamp_logged("sampling_rate", signal.sampling_rate, SAMPLING_RATE_HZ);
        signal.playback_speed = clamp_logged("playback_speed", signal.playback_speed, PLAYBACK_SPEED);
        if signal.channels.len() > CHANNEL_COUNT {
            warn!(
                "{} channel entries configured, only the first {CHANNEL_COUNT} are used",
                signal.channels.len()
            );
            signal.channels.truncate(CHANNEL_COUNT);
        }
        signal
            .channels
            .resize(CHANNEL_COUNT, ChannelConfig::default());
        for ch in &mut signal.channels {
            ch.frequency_hz = clamp_logged("frequency", ch.frequency_hz, FREQUENCY_HZ);
            ch.amplitude_uv = clamp_logged("amplitude", ch.amplitude_uv, AMPLITUDE_UV);
        }
        self
    }

    pub fn port(&self) -> u16 {
        clamp_port("port", self.network.port)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&GeneratorConfig::default()).unwrap();
        assert!(text.contains("port = 50012"));
        assert!(text.contains("mode = \"synthetic\""));
        assert!(text.contains("[[signal.channels]]"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: GeneratorConfig = toml::from_str(
            r#"
            [signal]
            mode = "replay"
            file = "session.csv"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.signal.mode, SourceMode::Replay);
        assert_eq!(cfg.signal.file.as_deref(), Some(Path::new("session.csv")));
        assert_eq!(cfg.signal.sampling_rate, 250.0);
        assert_eq!(cfg.network.max_clients, 5);
    }

    #[test]
    fn validated_clamps_out_of_range_values() {
        let mut cfg = GeneratorConfig::default();
        cfg.network.port = 0;
        cfg.network.max_clients = 0;
        cfg.signal.sampling_rate = 5000.0;
        cfg.signal.playback_speed = 0.1;
        cfg.signal.channels = vec![ChannelConfig {
            frequency_hz: 500.0,
            amplitude_uv: -10.0,
        }];

        let cfg = cfg.validated();
        assert_eq!(cfg.port(), 1);
        assert_eq!(cfg.network.max_clients, 1);
        assert_eq!(cfg.signal.sampling_rate, 1000.0);
        assert_eq!(cfg.signal.playback_speed, 0.5);
        assert_eq!(cfg.signal.channels.len(), CHANNEL_COUNT);
        assert_eq!(cfg.signal.channels[0].frequency_hz, 100.0);
        assert_eq!(cfg.signal.channels[0].amplitude_uv, 0.0);
        assert_eq!(cfg.signal.channels[7], ChannelConfig::default());
    }

    #[test]
    fn write_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.toml");
        GeneratorConfig::write_default(&path).unwrap();
        let cfg = GeneratorConfig::load(&path);
        assert_eq!(cfg.port(), 50012);
        assert_eq!(cfg.signal.channels.len(), CHANNEL_COUNT);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "network = 3").unwrap();
        assert_eq!(GeneratorConfig::load(&path).port(), 50012);
    }
}
