//! Sample producers and the cadence loop that drives them.
//!
//! A [`SignalGenerator`] owns one [`SignalSource`] and pushes one sample per
//! tick into a bounded channel. If the consumer falls behind, samples are
//! dropped and counted rather than letting the cadence slip.

mod replay;
mod synthetic;

pub use replay::{ReplaySource, ReplayTable};
pub use synthetic::{ChannelParams, DEFAULT_AMPLITUDE_UV, DEFAULT_FREQUENCY_HZ, SyntheticSource};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::EegError;
use crate::limits::{DEFAULT_SAMPLING_RATE_HZ, JOIN_TIMEOUT, SAMPLING_RATE_HZ, clamp_logged};
use crate::sample::SampleVector;
use crate::task::Worker;

// ── SignalSource ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum SignalSource {
    Synthetic(SyntheticSource),
    Replay(ReplaySource),
}

impl SignalSource {
    pub fn produce(&mut self) -> SampleVector {
        match self {
            Self::Synthetic(s) => s.produce(),
            Self::Replay(r) => r.produce(),
        }
    }

    /// Time between samples at the given base rate.
    pub fn period(&self, sampling_rate: f64) -> Duration {
        let rate = match self {
            Self::Synthetic(_) => sampling_rate,
            Self::Replay(r) => sampling_rate * r.speed(),
        };
        Duration::from_secs_f64(1.0 / rate)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Synthetic(_) => "synthetic",
            Self::Replay(_) => "replay",
        }
    }

    fn set_sampling_rate(&mut self, rate: f64) {
        if let Self::Synthetic(s) = self {
            s.set_sampling_rate(rate);
        }
    }
}

impl From<SyntheticSource> for SignalSource {
    fn from(s: SyntheticSource) -> Self {
        Self::Synthetic(s)
    }
}

impl From<ReplaySource> for SignalSource {
    fn from(r: ReplaySource) -> Self {
        Self::Replay(r)
    }
}

// ── SignalGenerator ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub produced: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    produced: AtomicU64,
    dropped: AtomicU64,
}

pub struct SignalGenerator {
    source: Arc<Mutex<SignalSource>>,
    sampling_rate: f64,
    counters: Arc<Counters>,
    worker: Option<Worker>,
}

impl SignalGenerator {
    pub fn new(source: impl Into<SignalSource>, sampling_rate: f64) -> Self {
        let rate = clamp_logged("sampling_rate", sampling_rate, SAMPLING_RATE_HZ);
        let mut source = source.into();
        source.set_sampling_rate(rate);
        Self {
            source: Arc::new(Mutex::new(source)),
            sampling_rate: rate,
            counters: Arc::new(Counters::default()),
            worker: None,
        }
    }

    pub fn synthetic() -> Self {
        Self::new(SyntheticSource::default(), DEFAULT_SAMPLING_RATE_HZ)
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn source_kind(&self) -> &'static str {
        self.source.lock().kind()
    }

    pub fn stats(&self) -> GeneratorStats {
        GeneratorStats {
            produced: self.counters.produced.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Start emitting samples into `tx`. A second call while running is a no-op.
    pub fn start(&mut self, tx: mpsc::Sender<SampleVector>) {
        if self.is_running() {
            debug!("signal generator already running");
            return;
        }
        let source = self.source.clone();
        let counters = self.counters.clone();
        let rate = self.sampling_rate;
        info!(
            "signal generator started ({}, {rate} Hz)",
            source.lock().kind()
        );
        self.worker = Some(Worker::spawn("signal-generator", move |token| {
            run_cadence(source, rate, tx, counters, token)
        }));
    }

    /// Stop the cadence loop and wait for it to exit.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown(JOIN_TIMEOUT).await;
            info!("signal generator stopped");
        }
    }

    /// Change the sampling rate. Only allowed while stopped.
    pub fn set_sampling_rate(&mut self, rate: f64) -> Result<f64, EegError> {
        if self.is_running() {
            return Err(EegError::InvalidState(
                "sampling rate can only change while stopped",
            ));
        }
        let rate = clamp_logged("sampling_rate", rate, SAMPLING_RATE_HZ);
        self.sampling_rate = rate;
        self.source.lock().set_sampling_rate(rate);
        Ok(rate)
    }

    /// Swap the source. Only allowed while stopped.
    pub fn set_source(&mut self, source: impl Into<SignalSource>) -> Result<(), EegError> {
        if self.is_running() {
            return Err(EegError::InvalidState("source can only change while stopped"));
        }
        let mut source = source.into();
        source.set_sampling_rate(self.sampling_rate);
        *self.source.lock() = source;
        Ok(())
    }

    /// Applies immediately, also while running.
    pub fn set_channel_params(
        &self,
        channel: usize,
        frequency_hz: f64,
        amplitude_uv: f64,
    ) -> Result<ChannelParams, EegError> {
        match &mut *self.source.lock() {
            SignalSource::Synthetic(s) => s.set_channel_params(channel, frequency_hz, amplitude_uv),
            SignalSource::Replay(_) => Err(EegError::InvalidState(
                "channel parameters apply to synthetic sources only",
            )),
        }
    }

    /// Applies from the next tick, also while running.
    pub fn set_playback_speed(&self, speed: f64) -> Result<f64, EegError> {
        match &mut *self.source.lock() {
            SignalSource::Replay(r) => Ok(r.set_speed(speed)),
            SignalSource::Synthetic(_) => Err(EegError::InvalidState(
                "playback speed applies to replay sources only",
            )),
        }
    }
}

async fn run_cadence(
    source: Arc<Mutex<SignalSource>>,
    sampling_rate: f64,
    tx: mpsc::Sender<SampleVector>,
    counters: Arc<Counters>,
    token: CancellationToken,
) {
    loop {
        let tick = Instant::now();
        let (sample, period) = {
            let mut src = source.lock();
            (src.produce(), src.period(sampling_rate))
        };

        match tx.try_send(sample) {
            Ok(()) => {
                counters.produced.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("sample consumer lagging, dropped one sample");
            }
            Err(TrySendError::Closed(_)) => {
                info!("sample consumer closed, stopping generator");
                break;
            }
        }

        let pause = period.saturating_sub(tick.elapsed());
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
