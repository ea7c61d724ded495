//! Generator service core logic.
//!
//! Wires a [`SignalGenerator`] to a [`Broadcaster`]: samples flow through a
//! bounded queue into `broadcast`, and throughput is logged once per second.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use eeg_core::{
    Broadcaster, BroadcasterStats, EegError, ReplaySource, SampleVector, SignalGenerator,
    SignalSource, SyntheticSource,
};

use crate::config::{GeneratorConfig, SourceMode};
use crate::replay::load_csv;

/// Samples buffered between the generator and the broadcaster.
const SAMPLE_QUEUE: usize = 256;
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Rates computed between two [`BroadcasterStats`] readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub frames_per_sec: f64,
    pub bytes_per_sec: f64,
}

impl Throughput {
    pub fn between(prev: BroadcasterStats, now: BroadcasterStats, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Self {
                frames_per_sec: 0.0,
                bytes_per_sec: 0.0,
            };
        }
        Self {
            frames_per_sec: now.frames_sent.saturating_sub(prev.frames_sent) as f64 / secs,
            bytes_per_sec: now.bytes_sent.saturating_sub(prev.bytes_sent) as f64 / secs,
        }
    }
}

// ── GeneratorService ─────────────────────────────────────────────

/// The top-level generator service.
pub struct GeneratorService {
    config: GeneratorConfig,
    generator: SignalGenerator,
    broadcaster: Broadcaster,
    port: u16,
    samples: Option<mpsc::Receiver<SampleVector>>,
    stop: CancellationToken,
}

impl GeneratorService {
    /// Build the configured source. Replay mode loads its CSV here.
    pub fn new(config: GeneratorConfig) -> Result<Self, EegError> {
        let config = config.validated();
        let generator = build_generator(&config)?;
        Ok(Self {
            port: config.port(),
            config,
            generator,
            broadcaster: Broadcaster::default(),
            samples: None,
            stop: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Handle that stops [`GeneratorService::run`] when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.samples.is_some()
    }

    /// Bind the broadcaster and start generating. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, EegError> {
        if self.samples.is_some() {
            return Err(EegError::InvalidState("generator service already started"));
        }
        let net = &self.config.network;
        let addr = self
            .broadcaster
            .start(&net.host, self.port, net.max_clients)
            .await?;

        let (tx, rx) = mpsc::channel(SAMPLE_QUEUE);
        self.generator.start(tx);
        self.samples = Some(rx);
        Ok(addr)
    }

    /// Run until the stop handle fires, then stop the generator before
    /// the broadcaster.
    pub async fn run(&mut self) -> Result<(), EegError> {
        if self.samples.is_none() {
            self.start().await?;
        }
        let Some(mut samples) = self.samples.take() else {
            return Err(EegError::InvalidState("generator service not started"));
        };

        let mut status = tokio::time::interval(STATUS_INTERVAL);
        status.tick().await;
        let mut last_stats = self.broadcaster.stats();
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                sample = samples.recv() => match sample {
                    Some(sample) => {
                        self.broadcaster.broadcast(&sample).await;
                    }
                    None => {
                        warn!("signal generator exited unexpectedly");
                        break;
                    }
                },
                _ = status.tick() => {
                    let now = self.broadcaster.stats();
                    let rate = Throughput::between(last_stats, now, last_tick.elapsed());
                    let dropped = self.generator.stats().dropped;
                    info!(
                        "clients: {}  frames/s: {:.0}  bytes/s: {:.0}  dropped: {dropped}",
                        self.broadcaster.client_count().await,
                        rate.frames_per_sec,
                        rate.bytes_per_sec,
                    );
                    last_stats = now;
                    last_tick = Instant::now();
                }
            }
        }

        self.generator.stop().await;
        drop(samples);
        self.broadcaster.stop().await;
        info!("generator service stopped");
        Ok(())
    }
}

fn build_generator(config: &GeneratorConfig) -> Result<SignalGenerator, EegError> {
    let signal = &config.signal;
    let source: SignalSource = match signal.mode {
        SourceMode::Synthetic => SyntheticSource::default().into(),
        SourceMode::Replay => {
            let path = signal
                .file
                .as_deref()
                .ok_or_else(|| EegError::Table("replay mode needs a CSV file".into()))?;
            ReplaySource::new(load_csv(path)?).into()
        }
    };

    let generator = SignalGenerator::new(source, signal.sampling_rate);
    match signal.mode {
        SourceMode::Synthetic => {
            for (channel, params) in signal.channels.iter().enumerate() {
                generator.set_channel_params(channel, params.frequency_hz, params.amplitude_uv)?;
            }
        }
        SourceMode::Replay => {
            generator.set_playback_speed(signal.playback_speed)?;
        }
    }
    info!(
        "source: {} at {} Hz",
        generator.source_kind(),
        generator.sampling_rate()
    );
    Ok(generator)
}

// ── Tests ────────────────────────────────────────────────────────
