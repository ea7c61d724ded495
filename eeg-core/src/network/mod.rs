//! TCP broadcast server plus the reconnecting TCP and WebSocket clients.

mod broadcaster;
mod client;
mod link;
mod websocket;

pub use broadcaster::{Broadcaster, BroadcasterEvent, BroadcasterStats, DEFAULT_WRITE_TIMEOUT};
pub use client::TcpClient;
pub use websocket::{OUTBOUND_CAPACITY, WsClient, WsPayload};

use crate::sample::SampleVector;

/// Capacity of every event channel returned by `subscribe()`.
pub const EVENT_CAPACITY: usize = 1024;

/// Events published by the reconnecting clients.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected(Endpoint),
    Disconnected,
    Error(String),
    /// One decoded frame (TCP client).
    Data(SampleVector),
    /// One inbound JSON message (WebSocket client).
    Message(serde_json::Value),
    ReconnectAttempt { attempt: u32, max: u32 },
    Log(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
