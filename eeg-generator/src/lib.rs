//! # eeg-generator: sample producer service
//!
//! Produces [`SampleVector`](eeg_core::SampleVector)s from a synthetic
//! waveform or a replayed CSV table and broadcasts each one as a wire
//! frame to every connected TCP receiver.
//!
//! ## Modes
//!
//! - **Synthetic**: per-channel three-harmonic sine composite.
//! - **Replay**: rows of a CSV file, looped, at an adjustable speed.

pub mod config;
pub mod replay;
pub mod service;
