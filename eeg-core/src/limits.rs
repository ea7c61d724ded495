//! Allowed ranges for every user-tunable parameter.
//!
//! Out-of-range values never fail an operation: they are clamped and the
//! clamp is logged as a [`EegError::ConfigValidation`] warning.

use std::time::Duration;

use crate::error::EegError;

pub const SAMPLING_RATE_HZ: (f64, f64) = (10.0, 1000.0);
pub const FREQUENCY_HZ: (f64, f64) = (0.1, 100.0);
pub const AMPLITUDE_UV: (f64, f64) = (0.0, 1000.0);
pub const PLAYBACK_SPEED: (f64, f64) = (0.5, 5.0);

pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 250.0;
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Reconnect attempts before a client gives up. Not configurable.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
/// Shortest reconnect interval accepted from callers.
pub const MIN_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Bounded wait used when joining worker tasks and threads.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Clamp `value` into `[min, max]`, logging a warning when it moves.
///
/// Non-finite input is replaced by `min`.
pub fn clamp_logged(name: &'static str, value: f64, (min, max): (f64, f64)) -> f64 {
    if value.is_finite() && (min..=max).contains(&value) {
        return value;
    }
    let clamped = if value.is_finite() {
        value.clamp(min, max)
    } else {
        min
    };
    tracing::warn!("{}", EegError::ConfigValidation { name, value, min, max });
    clamped
}

/// Clamp a TCP port into 1..=65535.
pub fn clamp_port(name: &'static str, port: u32) -> u16 {
    let clamped = clamp_logged(name, port as f64, (1.0, 65535.0));
    clamped as u16
}

/// Clamp a reconnect interval to at least [`MIN_RECONNECT_INTERVAL`].
pub fn clamp_reconnect_interval(secs: f64) -> Duration {
    let bounds = (
        MIN_RECONNECT_INTERVAL.as_secs_f64(),
        MAX_RECONNECT_INTERVAL.as_secs_f64(),
    );
    let secs = clamp_logged("reconnect_interval", secs, bounds);
    Duration::from_secs_f64(secs)
}

// ── Tests ────────────────────────────────────────────────────────
