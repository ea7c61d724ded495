//! Connection state machine shared by the TCP and WebSocket clients.
//!
//! Provides a `ClientState` enum that models the full lifecycle of an
//! outbound reconnecting connection, with validated transitions that
//! return `Result` instead of panicking.

use std::time::{Duration, Instant};

use crate::error::EegError;
use crate::limits::{DEFAULT_RECONNECT_INTERVAL, MAX_RECONNECT_ATTEMPTS, clamp_reconnect_interval};

// ── ClientState ──────────────────────────────────────────────────

/// The current phase of an outbound connection.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲               │              │
///       │               ▼              ▼
///       ├──────── Reconnecting ◄───────┘
///       │               │
///       │               ▼ (max attempts)
///       └─────────── Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClientState {
    /// No connection and no retry pending. Initial state.
    #[default]
    Disconnected,

    /// First connect attempt in flight.
    Connecting,

    /// Link is up and the receive loop is running.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },

    /// Waiting for, or performing, retry number `attempt`.
    Reconnecting { attempt: u32 },

    /// Retries exhausted. Terminal until a manual `connect`.
    Failed,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Reconnecting { attempt } => write!(f, "Reconnecting ({attempt})"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl ClientState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Whether a manual `connect` may start from here.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// How long the connection has been in the `Connected` state.
    ///
    /// Returns `None` for any other state.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`, `Failed`.
    pub fn begin_connect(&mut self) -> Result<(), EegError> {
        match self {
            Self::Disconnected | Self::Failed => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(EegError::InvalidState(
                "cannot connect: already connecting or connected",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`, `Reconnecting`.
    pub fn complete_connect(&mut self) -> Result<(), EegError> {
        match self {
            Self::Connecting | Self::Reconnecting { .. } => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(EegError::InvalidState(
                "cannot complete connect: no attempt in flight",
            )),
        }
    }

    /// Transition to `Reconnecting { attempt }`.
    ///
    /// Valid from: `Connecting`, `Connected`, `Reconnecting`.
    pub fn begin_reconnect(&mut self, attempt: u32) -> Result<(), EegError> {
        match self {
            Self::Connecting | Self::Connected { .. } | Self::Reconnecting { .. } => {
                *self = Self::Reconnecting { attempt };
                Ok(())
            }
            _ => Err(EegError::InvalidState(
                "cannot reconnect: client is idle",
            )),
        }
    }

    /// Transition to `Failed`.
    ///
    /// Valid from: `Connecting`, `Reconnecting`.
    pub fn fail(&mut self) -> Result<(), EegError> {
        match self {
            Self::Connecting | Self::Reconnecting { .. } => {
                *self = Self::Failed;
                Ok(())
            }
            _ => Err(EegError::InvalidState(
                "cannot fail: no attempt in flight",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    ///
    /// Used by `disconnect()` and when auto-reconnect is off.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── ReconnectPolicy ──────────────────────────────────────────────

/// Retry settings for a reconnecting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Policy from user input; the interval is clamped to at least one second.
    pub fn new(enabled: bool, interval_secs: f64) -> Self {
        Self {
            enabled,
            interval: clamp_reconnect_interval(interval_secs),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && attempt <= self.max_attempts
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut s = ClientState::default();
        s.begin_connect().unwrap();
        assert_eq!(s, ClientState::Connecting);
        s.complete_connect().unwrap();
        assert!(s.is_connected());
        assert!(s.connected_duration().is_some());
    }

    #[test]
    fn drop_then_recover() {
        let mut s = ClientState::default();
        s.begin_connect().unwrap();
        s.complete_connect().unwrap();
        s.begin_reconnect(1).unwrap();
        s.begin_reconnect(2).unwrap();
        assert_eq!(s, ClientState::Reconnecting { attempt: 2 });
        s.complete_connect().unwrap();
        assert!(s.is_connected());
    }

    #[test]
    fn exhaustion_is_terminal_until_manual_connect() {
        let mut s = ClientState::default();
        s.begin_connect().unwrap();
        s.begin_reconnect(10).unwrap();
        s.fail().unwrap();
        assert_eq!(s, ClientState::Failed);
        assert!(s.begin_reconnect(11).is_err());
        assert!(s.complete_connect().is_err());
        s.begin_connect().unwrap();
        assert_eq!(s, ClientState::Connecting);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut s = ClientState::default();
        assert!(s.complete_connect().is_err());
        assert!(s.fail().is_err());
        s.begin_connect().unwrap();
        assert!(s.begin_connect().is_err());
    }

    #[test]
    fn force_disconnect_from_anywhere() {
        let mut s = ClientState::Reconnecting { attempt: 4 };
        s.force_disconnect();
        assert!(s.is_idle());
    }

    #[test]
    fn policy_clamps_and_counts() {
        let p = ReconnectPolicy::new(true, 0.1);
        assert_eq!(p.interval, Duration::from_secs(1));
        assert!(p.allows(10));
        assert!(!p.allows(11));
        assert!(!ReconnectPolicy::disabled().allows(1));
    }
}
