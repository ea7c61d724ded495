//! # eeg-receiver: sample consumer service
//!
//! Connects to an `eeg-generator`, decodes its frames into a
//! [`RingBuffer`](eeg_core::RingBuffer) for plotting, and optionally
//! re-publishes every sample as JSON to a WebSocket peer. Both links
//! reconnect on their own when the peer goes away.

pub mod config;
pub mod pipeline;
