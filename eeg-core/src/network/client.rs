//! Outbound TCP client with automatic reconnect.
//!
//! A supervisor task owns the socket. It connects, runs the receive loop
//! until the peer goes away, then retries according to the
//! [`ReconnectPolicy`]. Every attempt opens a fresh socket.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::link::Link;
use super::{ClientEvent, Endpoint};
use crate::codec::{EegCodec, FrameCodec};
use crate::error::EegError;
use crate::limits::{DEFAULT_CONNECT_TIMEOUT, JOIN_TIMEOUT};
use crate::state::{ClientState, ReconnectPolicy};
use crate::task::Worker;

pub struct TcpClient {
    link: Arc<Link>,
    codec: FrameCodec,
    connect_timeout: Duration,
    endpoint: Option<Endpoint>,
    supervisor: Option<Worker>,
}

impl Default for TcpClient {
    fn default() -> Self {
        Self::with_policy(ReconnectPolicy::default())
    }
}

impl TcpClient {
    /// Client with an explicit policy. The interval is used as given.
    pub fn with_policy(policy: ReconnectPolicy) -> Self {
        Self {
            link: Arc::new(Link::new("tcp", policy)),
            codec: FrameCodec::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            endpoint: None,
            supervisor: None,
        }
    }

    pub fn with_codec(mut self, codec: FrameCodec) -> Self {
        self.codec = codec;
        self
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

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Enable or disable auto-reconnect. The interval is clamped to >= 1 s.
    pub fn set_auto_reconnect(&self, enabled: bool, interval_secs: f64) {
        self.link.set_policy(ReconnectPolicy::new(enabled, interval_secs));
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.link.policy()
    }

    /// Connect to `host:port` and return the outcome of the first attempt.
    ///
    /// On failure with auto-reconnect enabled, retries continue in the
    /// background; watch [`ClientEvent`]s or [`TcpClient::state`].
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), EegError> {
        if let Some(worker) = self.supervisor.take() {
            if !worker.is_finished() && !self.link.state().is_idle() {
                self.supervisor = Some(worker);
                return Err(EegError::InvalidState("client already active"));
            }
            worker.shutdown(JOIN_TIMEOUT).await;
        }
        self.link.begin_connect()?;

        let endpoint = Endpoint::new(host, port);
        self.endpoint = Some(endpoint.clone());
        self.link.log(format!("connecting to {endpoint}"));

        let (first_tx, first_rx) = oneshot::channel();
        let link = self.link.clone();
        let codec = self.codec;
        let timeout = self.connect_timeout;
        self.supervisor = Some(Worker::spawn("tcp-client", move |token| {
            supervise(link, endpoint, codec, timeout, first_tx, token)
        }));

        first_rx.await.map_err(|_| EegError::ChannelClosed)?
    }

    /// Stop any connection or pending retry. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        if let Some(worker) = self.supervisor.take() {
            worker.shutdown(JOIN_TIMEOUT).await;
        }
        if self.link.reset() {
            self.link.log("disconnected".into());
        }
    }
}

async fn open(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream, EegError> {
    let connect = TcpStream::connect((endpoint.host(), endpoint.port()));
    let stream = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| EegError::Timeout(timeout))??;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed: {e}");
    }
    Ok(stream)
}

async fn supervise(
    link: Arc<Link>,
    endpoint: Endpoint,
    codec: FrameCodec,
    timeout: Duration,
    first_tx: oneshot::Sender<Result<(), EegError>>,
    token: CancellationToken,
) {
    let mut first = Some(first_tx);
    let mut attempt = 0u32;

    loop {
        let outcome = tokio::select! {
            _ = token.cancelled() => return,
            outcome = open(&endpoint, timeout) => outcome,
        };

        let (was_connected, failure) = match outcome {
            Ok(stream) => {
                attempt = 0;
                link.connected(&endpoint);
                if let Some(tx) = first.take() {
                    let _ = tx.send(Ok(()));
                }
                let reason = receive(stream, codec, &link, &token).await;
                if token.is_cancelled() {
                    return;
                }
                link.connection_lost(&endpoint, reason);
                (true, None)
            }
            Err(e) => {
                link.attempt_failed(&endpoint, &e);
                (false, Some(e))
            }
        };

        let retry = link.next_retry(&endpoint, &mut attempt, was_connected);
        // The caller of `connect` sees the state the policy left behind.
        if let Some(e) = failure
            && let Some(tx) = first.take()
        {
            let _ = tx.send(Err(e));
        }
        let Some(pause) = retry else {
            return;
        };
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

/// Read frames until the peer closes, an I/O error occurs or the token fires.
///
/// Returns the error text for abnormal endings.
async fn receive(
    stream: TcpStream,
    codec: FrameCodec,
    link: &Link,
    token: &CancellationToken,
) -> Option<String> {
    let mut frames = FramedRead::new(stream, EegCodec::new(codec));
    loop {
        tokio::select! {
            _ = token.cancelled() => return None,
            next = frames.next() => match next {
                Some(Ok(sample)) => link.emit(ClientEvent::Data(sample)),
                Some(Err(e)) => {
                    warn!("receive failed: {e}");
                    return Some(e.to_string());
                }
                None => {
                    let stats = frames.decoder().stats();
                    debug!(
                        "stream ended: {} frames, {} bytes discarded",
                        stats.frames_decoded, stats.bytes_discarded
                    );
                    return None;
                }
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleVector;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn quick_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: true,
            interval: Duration::from_millis(20),
            max_attempts: 10,
        }
    }

    #[tokio::test]
    async fn receives_frames_from_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let codec = FrameCodec::default();
            for i in 0..3 {
                let frame = codec.encode(&SampleVector::from_slices(&[i as f64 * 10.0], &[]));
                sock.write_all(&frame).await.unwrap();
            }
            sock
        });

        let mut client = TcpClient::with_policy(ReconnectPolicy::disabled());
        let mut events = client.subscribe();
        client.connect("127.0.0.1", port).await.unwrap();
        assert!(client.is_connected());

        let mut values = Vec::new();
        while values.len() < 3 {
            if let ClientEvent::Data(s) = events.recv().await.unwrap() {
                values.push(s.channels[0]);
            }
        }
        assert!((values[2] - 20.0).abs() < 1e-3);

        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Disconnected);
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn refused_without_reconnect_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = TcpClient::with_policy(ReconnectPolicy::disabled());
        let err = client.connect("127.0.0.1", port).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = TcpClient::with_policy(quick_policy());
        let mut events = client.subscribe();
        assert!(client.connect("127.0.0.1", port).await.is_err());

        let mut attempts = 0;
        loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Ok(ClientEvent::ReconnectAttempt { .. })) => attempts += 1,
                Ok(Ok(ClientEvent::Error(msg))) if msg.contains("reconnect failed") => break,
                Ok(Ok(_)) => {}
                other => panic!("unexpected: {other:?}"),
            }
        }
        assert_eq!(attempts, 10);
        assert_eq!(client.state(), ClientState::Failed);

        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(ev) = events.try_recv() {
            assert!(!matches!(ev, ClientEvent::ReconnectAttempt { .. }));
        }
        client.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut client = TcpClient::default();
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[test]
    fn auto_reconnect_interval_is_clamped() {
        let client = TcpClient::default();
        client.set_auto_reconnect(true, 0.25);
        assert_eq!(client.policy().interval, Duration::from_secs(1));
        client.set_auto_reconnect(false, 5.0);
        assert!(!client.policy().enabled);
    }
}
