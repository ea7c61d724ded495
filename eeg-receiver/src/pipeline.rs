//! Receiver pipeline: TCP frames into the ring buffer and out to WebSocket.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use eeg_core::{ClientEvent, EegError, RingBuffer, SampleVector, TcpClient, WsClient};

use crate::config::ReceiverConfig;

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Render the once-per-second status line.
pub fn status_line(frames_per_sec: f64, latest: Option<&SampleVector>) -> String {
    let mut line = format!("frames/s: {frames_per_sec:.1}");
    match latest {
        Some(sample) => {
            for (i, v) in sample.channels.iter().enumerate() {
                line.push_str(&format!("  ch{}: {v:.1}", i + 1));
            }
        }
        None => line.push_str("  (no data)"),
    }
    line
}

pub struct ReceiverPipeline {
    config: ReceiverConfig,
    buffer: Arc<RingBuffer>,
    tcp: TcpClient,
    ws: Option<WsClient>,
    frames: u64,
    stop: CancellationToken,
}

impl ReceiverPipeline {
    pub fn new(config: ReceiverConfig) -> Self {
        let config = config.validated();
        let buffer = Arc::new(RingBuffer::with_sampling_rate(
            config.buffer.capacity,
            config.buffer.sampling_rate,
        ));
        let tcp = TcpClient::with_policy(config.reconnect_policy())
            .with_connect_timeout(config.connect_timeout());
        let ws = config.websocket.enabled.then(|| {
            WsClient::with_policy(config.reconnect_policy())
                .with_connect_timeout(config.connect_timeout())
        });
        Self {
            config,
            buffer,
            tcp,
            ws,
            frames: 0,
            stop: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Shared view of the sample history.
    pub fn buffer(&self) -> Arc<RingBuffer> {
        self.buffer.clone()
    }

    pub fn tcp(&self) -> &TcpClient {
        &self.tcp
    }

    pub fn websocket(&self) -> Option<&WsClient> {
        self.ws.as_ref()
    }

    /// Frames received since the pipeline was created.
    pub fn frames_received(&self) -> u64 {
        self.frames
    }

    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Connect both links, then route events until the stop handle fires.
    ///
    /// A failed first attempt is fatal only when reconnect is disabled.
    pub async fn run(&mut self) -> Result<(), EegError> {
        let mut events = self.tcp.subscribe();
        self.connect_websocket().await;

        let (host, port) = (self.config.network.host.clone(), self.config.port());
        if let Err(e) = self.tcp.connect(&host, port).await {
            if !self.tcp.policy().enabled {
                self.shutdown().await;
                return Err(e);
            }
            warn!("connect to {host}:{port} failed ({e}), retrying in background");
        }

        let mut status = tokio::time::interval(STATUS_INTERVAL);
        status.tick().await;
        let mut last_frames = self.frames;
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => self.on_event(event),
                    Err(RecvError::Lagged(n)) => warn!("receiver lagged, {n} events skipped"),
                    Err(RecvError::Closed) => break,
                },
                _ = status.tick() => {
                    let secs = last_tick.elapsed().as_secs_f64();
                    let rate = (self.frames - last_frames) as f64 / secs.max(f64::EPSILON);
                    info!("{}", status_line(rate, self.buffer.latest().as_ref()));
                    last_frames = self.frames;
                    last_tick = Instant::now();
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn on_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Data(sample) => {
                self.frames += 1;
                self.buffer.push(&sample);
                if let Some(ws) = &self.ws
                    && ws.is_connected()
                    && let Err(e) = ws.send(&sample)
                {
                    debug!("websocket re-publish skipped: {e}");
                }
            }
            ClientEvent::Connected(endpoint) => info!("receiving from {endpoint}"),
            ClientEvent::Disconnected => warn!("generator link lost"),
            ClientEvent::Error(msg) => warn!("generator link: {msg}"),
            ClientEvent::ReconnectAttempt { attempt, max } => {
                debug!("reconnect attempt {attempt}/{max}")
            }
            ClientEvent::Message(_) | ClientEvent::Log(_) => {}
        }
    }

    /// Start the WebSocket context on a blocking thread. Failures are logged.
    async fn connect_websocket(&mut self) {
        let Some(mut ws) = self.ws.take() else {
            return;
        };
        let host = self.config.websocket.host.clone();
        let port = self.config.websocket_port();
        let joined = tokio::task::spawn_blocking(move || {
            let outcome = ws.connect(&host, port);
            (ws, outcome)
        })
        .await;
        match joined {
            Ok((ws, outcome)) => {
                if let Err(e) = outcome {
                    warn!("websocket connect failed: {e}");
                }
                self.ws = Some(ws);
            }
            Err(e) => warn!("websocket connect task failed: {e}"),
        }
    }

    /// Disconnect the TCP link, then the WebSocket link.
    pub async fn shutdown(&mut self) {
        self.tcp.disconnect().await;
        if let Some(mut ws) = self.ws.take() {
            match tokio::task::spawn_blocking(move || {
                ws.disconnect();
                ws
            })
            .await
            {
                Ok(ws) => self.ws = Some(ws),
                Err(e) => warn!("websocket disconnect task failed: {e}"),
            }
        }
        info!("receiver stopped after {} frames", self.frames);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_core::{Broadcaster, ClientState};
    use futures::StreamExt;
    use tokio::net::TcpListener;

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    fn local_config(port: u16) -> ReceiverConfig {
        let mut cfg = ReceiverConfig::default();
        cfg.network.port = u32::from(port);
        cfg.reconnect.enabled = false;
        cfg
    }

    #[test]
    fn status_line_lists_every_channel() {
        let sample = SampleVector::from_slices(&[1.0, -2.5, 0.0, 0.0, 0.0, 0.0, 0.0, 8.04], &[]);
        let line = status_line(249.96, Some(&sample));
        assert!(line.starts_with("frames/s: 250.0"));
        assert!(line.contains("ch2: -2.5"));
        assert!(line.contains("ch8: 8.0"));
        assert!(status_line(0.0, None).ends_with("(no data)"));
    }

    #[tokio::test]
    async fn refused_without_reconnect_fails_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut pipeline = ReceiverPipeline::new(local_config(port));
        assert!(pipeline.run().await.is_err());
        assert_eq!(pipeline.tcp().state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn frames_fill_buffer_and_reach_websocket() {
        let mut broadcaster = Broadcaster::default();
        let addr = broadcaster.start("127.0.0.1", 0, 5).await.unwrap();

        let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_port = ws_listener.local_addr().unwrap().port();
        let ws_server = tokio::spawn(async move {
            let (stream, _) = ws_listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            let value: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
            value
        });

        let mut cfg = local_config(addr.port());
        cfg.websocket.enabled = true;
        cfg.websocket.port = u32::from(ws_port);
        let mut pipeline = ReceiverPipeline::new(cfg);
        let buffer = pipeline.buffer();
        let stop = pipeline.stop_handle();
        let task = tokio::spawn(async move {
            pipeline.run().await.unwrap();
            pipeline
        });

        for _ in 0..500 {
            if broadcaster.client_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broadcaster.client_count().await, 1);
        for i in 0..20 {
            let sample = SampleVector::from_slices(&[i as f64, 50.0], &[1.0, 0.0]);
            broadcaster.broadcast(&sample).await;
        }
        wait_until(|| buffer.len() == 20).await;

        let latest = buffer.latest().unwrap();
        assert!((latest.channels[0] - 19.0).abs() < 1e-3);

        let published = tokio::time::timeout(Duration::from_secs(5), ws_server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published["channels"].as_array().unwrap().len(), 8);
        assert!(published["timestamp"].is_string());

        stop.cancel();
        let pipeline = task.await.unwrap();
        assert_eq!(pipeline.frames_received(), 20);
        assert_eq!(pipeline.tcp().state(), ClientState::Disconnected);
        broadcaster.stop().await;
    }
}
