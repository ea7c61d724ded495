//! WebSocket re-publish client.
//!
//! Each `connect()` creates a dedicated OS thread running a current-thread
//! tokio runtime. The socket and its message loop live entirely on that
//! runtime; the caller talks to it through a bounded channel. Teardown
//! runs in a fixed order: stop accepting sends, cancel the token, let the
//! runtime drop its tasks, then join the thread with a bounded wait.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::link::Link;
use super::{ClientEvent, Endpoint};
use crate::error::EegError;
use crate::limits::{DEFAULT_CONNECT_TIMEOUT, JOIN_TIMEOUT};
use crate::sample::{CHANNEL_COUNT, LABEL_COUNT, SampleVector};
use crate::state::{ClientState, ReconnectPolicy};

/// JSON body of one re-published sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsPayload {
    pub channels: [f64; CHANNEL_COUNT],
    pub labels: [f64; LABEL_COUNT],
    /// RFC 3339 / ISO-8601, UTC.
    pub timestamp: String,
}

impl WsPayload {
    pub fn now(sample: &SampleVector) -> Self {
        let sample = sample.sanitized();
        Self {
            channels: sample.channels,
            labels: sample.labels,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Messages queued for the socket. Sends beyond this are dropped and counted.
pub const OUTBOUND_CAPACITY: usize = 256;

type Outbound = mpsc::Sender<String>;

struct Context {
    cancel: CancellationToken,
    thread: JoinHandle<()>,
    done: std_mpsc::Receiver<()>,
}

pub struct WsClient {
    link: Arc<Link>,
    outbound: Arc<Mutex<Option<Outbound>>>,
    dropped: AtomicU64,
    connect_timeout: Duration,
    context: Option<Context>,
}

impl Default for WsClient {
    fn default() -> Self {
        Self::with_policy(ReconnectPolicy::default())
    }
}

impl WsClient {
    pub fn with_policy(policy: ReconnectPolicy) -> Self {
        Self {
            link: Arc::new(Link::new("websocket", policy)),
            outbound: Arc::new(Mutex::new(None)),
            dropped: AtomicU64::new(0),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            context: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.link.subscribe()
    }

    pub fn state(&self) -> ClientState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Enable or disable auto-reconnect. The interval is clamped to >= 1 s.
    pub fn set_auto_reconnect(&self, enabled: bool, interval_secs: f64) {
        self.link.set_policy(ReconnectPolicy::new(enabled, interval_secs));
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.link.policy()
    }

    /// Messages discarded because the outbound queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Start the connection context and block until the first attempt
    /// reports back or the connect timeout (plus a margin) elapses.
    ///
    /// Call from a blocking context (`spawn_blocking`, a plain thread).
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), EegError> {
        if self.context.as_ref().is_some_and(|c| !c.thread.is_finished())
            && !self.link.state().is_idle()
        {
            return Err(EegError::InvalidState("client already active"));
        }
        self.teardown();
        self.link.begin_connect()?;

        let endpoint = Endpoint::new(host, port);
        self.link.log(format!("connecting to {}", endpoint.ws_url()));

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (done_tx, done_rx) = std_mpsc::channel();
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let cancel = CancellationToken::new();

        let session = Session {
            link: self.link.clone(),
            outbound: self.outbound.clone(),
            endpoint,
            connect_timeout: self.connect_timeout,
            cancel: cancel.clone(),
        };
        *self.outbound.lock() = Some(out_tx);

        let spawned = std::thread::Builder::new()
            .name("ws-client".into())
            .spawn(move || {
                session.run(ready_tx, out_rx);
                let _ = done_tx.send(());
            });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.outbound.lock().take();
                self.link.reset();
                return Err(e.into());
            }
        };

        self.context = Some(Context {
            cancel,
            thread,
            done: done_rx,
        });

        let wait = self.connect_timeout + Duration::from_secs(1);
        match ready_rx.recv_timeout(wait) {
            Ok(outcome) => outcome,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!("websocket connect did not report within {wait:?}");
                self.link
                    .emit(ClientEvent::Error(EegError::Timeout(wait).to_string()));
                Err(EegError::Timeout(wait))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(EegError::ChannelClosed),
        }
    }

    /// Queue one sample for sending as JSON.
    ///
    /// Fails with `NotConnected` and schedules nothing while the link is down.
    /// When the peer is not keeping up the sample is dropped and counted.
    pub fn send(&self, sample: &SampleVector) -> Result<(), EegError> {
        if !self.link.state().is_connected() {
            return Err(EegError::NotConnected);
        }
        let text = serde_json::to_string(&WsPayload::now(sample))?;
        self.send_text(text)
    }

    /// Queue an arbitrary JSON value.
    pub fn send_json(&self, value: &serde_json::Value) -> Result<(), EegError> {
        if !self.link.state().is_connected() {
            return Err(EegError::NotConnected);
        }
        self.send_text(serde_json::to_string(value)?)
    }

    fn send_text(&self, text: String) -> Result<(), EegError> {
        let guard = self.outbound.lock();
        let tx = guard.as_ref().ok_or(EegError::NotConnected)?;
        match tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("websocket outbound queue full, {total} messages dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(EegError::ChannelClosed),
        }
    }

    /// Close the connection and destroy its context. Safe in any state.
    pub fn disconnect(&mut self) {
        self.teardown();
        if self.link.reset() {
            self.link.log("disconnected".into());
        }
    }

    fn teardown(&mut self) {
        self.outbound.lock().take();
        let Some(ctx) = self.context.take() else {
            return;
        };
        ctx.cancel.cancel();
        match ctx.done.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if ctx.thread.join().is_err() {
                    warn!("websocket context thread panicked");
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!("websocket context did not stop within {JOIN_TIMEOUT:?}, detaching");
            }
        }
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.outbound.lock().take();
        if let Some(ctx) = &self.context {
            ctx.cancel.cancel();
        }
    }
}

// ── Context side ─────────────────────────────────────────────────

struct Session {
    link: Arc<Link>,
    outbound: Arc<Mutex<Option<Outbound>>>,
    endpoint: Endpoint,
    connect_timeout: Duration,
    cancel: CancellationToken,
}

enum SessionEnd {
    Cancelled,
    Lost(Option<String>),
}

impl Session {
    fn run(
        self,
        ready: std_mpsc::Sender<Result<(), EegError>>,
        outbound: mpsc::Receiver<String>,
    ) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = ready.send(Err(e.into()));
                return;
            }
        };
        runtime.block_on(self.supervise(ready, outbound));
        // Dropping the runtime cancels anything still scheduled on it.
        drop(runtime);
        debug!("websocket context closed");
    }

    async fn supervise(
        &self,
        ready: std_mpsc::Sender<Result<(), EegError>>,
        mut outbound: mpsc::Receiver<String>,
    ) {
        let url = self.endpoint.ws_url();
        let mut first = Some(ready);
        let mut attempt = 0u32;

        loop {
            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return,
                opened = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())) => opened,
            };
            let opened = match opened {
                Ok(Ok((ws, _response))) => Ok(ws),
                Ok(Err(e)) => Err(EegError::from(e)),
                Err(_) => Err(EegError::Timeout(self.connect_timeout)),
            };

            let (was_connected, failure) = match opened {
                Ok(ws) => {
                    attempt = 0;
                    // Drop anything queued before this connection existed.
                    while outbound.try_recv().is_ok() {}
                    self.link.connected(&self.endpoint);
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Ok(()));
                    }
                    match self.pump(ws, &mut outbound).await {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Lost(reason) => {
                            self.link.connection_lost(&self.endpoint, reason);
                            (true, None)
                        }
                    }
                }
                Err(e) => {
                    self.link.attempt_failed(&self.endpoint, &e);
                    (false, Some(e))
                }
            };

            let retry = self.link.next_retry(&self.endpoint, &mut attempt, was_connected);
            if let Some(e) = failure
                && let Some(tx) = first.take()
            {
                let _ = tx.send(Err(e));
            }
            let Some(pause) = retry else {
                self.outbound.lock().take();
                return;
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    async fn pump<S>(
        &self,
        ws: tokio_tungstenite::WebSocketStream<S>,
        outbound: &mut mpsc::Receiver<String>,
    ) -> SessionEnd
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                queued = outbound.recv() => match queued {
                    Some(text) => {
                        if let Err(e) = write.send(Message::text(text)).await {
                            return SessionEnd::Lost(Some(e.to_string()));
                        }
                    }
                    None => return SessionEnd::Cancelled,
                },
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let value = serde_json::from_str(text.as_str())
                            .unwrap_or_else(|_| serde_json::json!({ "raw": text.as_str() }));
                        self.link.emit(ClientEvent::Message(value));
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost(None),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(Some(e.to_string())),
                },
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
