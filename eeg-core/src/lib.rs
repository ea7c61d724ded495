//! # eeg-core
//!
//! Core library for streaming multi-channel EEG samples between a
//! generator and one or more receivers.
//!
//! This crate contains:
//! - **Sample model**: `SampleVector` (8 channels + 2 labels)
//! - **Codec**: `FrameCodec` for the 34-byte wire frame, `StreamReassembler`
//!   for recovering frames from a chunked byte stream, and `EegCodec` for
//!   `tokio_util` framed I/O
//! - **Sources**: `SignalGenerator` driving a synthetic or replay `SignalSource`
//! - **Network**: `Broadcaster` (TCP fan-out), `TcpClient` and `WsClient`
//!   (reconnecting clients)
//! - **Buffer**: `RingBuffer`, a per-channel circular store for plotting
//! - **State**: `ClientState` machine and `ReconnectPolicy`
//! - **Task**: `Worker`, a cancellable background task
//! - **Error**: `EegError`, a `thiserror`-based error hierarchy

pub mod buffer;
pub mod codec;
pub mod error;
pub mod limits;
pub mod network;
pub mod sample;
pub mod source;
pub mod state;
pub mod task;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use buffer::{BufferSnapshot, RingBuffer};
pub use codec::{EegCodec, FRAME_LEN, FrameCodec, ReassemblerStats, StreamReassembler};
pub use error::EegError;
pub use network::{
    Broadcaster, BroadcasterEvent, BroadcasterStats, ClientEvent, Endpoint, TcpClient, WsClient,
    WsPayload,
};
pub use sample::{CHANNEL_COUNT, LABEL_COUNT, SampleVector};
pub use source::{
    ChannelParams, GeneratorStats, ReplaySource, ReplayTable, SignalGenerator, SignalSource,
    SyntheticSource,
};
pub use state::{ClientState, ReconnectPolicy};
pub use task::Worker;
