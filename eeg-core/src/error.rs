//! Domain-specific error types for the EEG streaming stack.
//!
//! All fallible operations return `Result<T, EegError>`.
//! Frame-level errors never escape the reassembler; transport errors are
//! surfaced to subscribers as events; configuration errors are logged and
//! the offending value is clamped.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the EEG streaming stack.
#[derive(Debug, Error)]
pub enum EegError {
    // ── Frame Errors ─────────────────────────────────────────────
    /// A frame did not carry the expected header or footer sentinel.
    #[error("frame format error: {0}")]
    FrameFormat(&'static str),

    /// The byte span handed to the decoder is not one frame long.
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidFrameLength { expected: usize, actual: usize },

    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error (refused, reset, broken pipe).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The WebSocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// An operation needed a live connection and there was none.
    #[error("not connected")]
    NotConnected,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Policy Errors ────────────────────────────────────────────
    /// The broadcaster already serves its maximum number of clients.
    #[error("client limit reached ({max} clients)")]
    CapacityExceeded { max: usize },

    /// A configuration value was outside its allowed range and was clamped.
    #[error("{name} = {value} outside [{min}, {max}], clamped")]
    ConfigValidation {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Automatic reconnection gave up.
    #[error("reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// A state transition or call was made in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    // ── Serialization Errors ─────────────────────────────────────
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A replay table could not be parsed.
    #[error("table error: {0}")]
    Table(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl EegError {
    /// Whether the reconnect policy should react to this error.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EegError::Transport(_) | EegError::Timeout(_) | EegError::WebSocket(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for EegError {
    fn from(s: String) -> Self {
        EegError::Other(s)
    }
}

impl From<&str> for EegError {
    fn from(s: &str) -> Self {
        EegError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for EegError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        EegError::ChannelClosed
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EegError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        EegError::WebSocket(e.to_string())
    }
}
