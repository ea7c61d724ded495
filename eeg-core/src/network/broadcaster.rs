//! TCP fan-out server: every connected client receives every frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::EVENT_CAPACITY;
use crate::codec::{FRAME_LEN, FrameCodec};
use crate::error::EegError;
use crate::limits::JOIN_TIMEOUT;
use crate::sample::SampleVector;
use crate::task::Worker;

/// A client that does not take a frame within this bound is dropped.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcasterEvent {
    Listening(SocketAddr),
    ClientConnected(SocketAddr),
    ClientRejected(SocketAddr),
    ClientDisconnected(SocketAddr),
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcasterStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

struct Peer {
    addr: SocketAddr,
    stream: TcpStream,
}

#[derive(Default)]
struct Counters {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

type PeerList = Arc<Mutex<Vec<Peer>>>;

pub struct Broadcaster {
    codec: FrameCodec,
    write_timeout: Duration,
    peers: PeerList,
    events: broadcast::Sender<BroadcasterEvent>,
    counters: Arc<Counters>,
    acceptor: Option<Worker>,
    local_addr: Option<SocketAddr>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(FrameCodec::default())
    }
}

impl Broadcaster {
    pub fn new(codec: FrameCodec) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            codec,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            peers: Arc::new(Mutex::new(Vec::new())),
            events,
            counters: Arc::new(Counters::default()),
            acceptor: None,
            local_addr: None,
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcasterEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.acceptor.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Address actually bound, useful when started on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn client_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            frames_sent: self.counters.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Bind and start accepting up to `max_clients` concurrent clients.
    pub async fn start(
        &mut self,
        host: &str,
        port: u16,
        max_clients: usize,
    ) -> Result<SocketAddr, EegError> {
        if self.is_running() {
            return Err(EegError::InvalidState("broadcaster already running"));
        }
        let max_clients = if max_clients == 0 {
            warn!("max_clients = 0 is not allowed, using 1");
            1
        } else {
            max_clients
        };

        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        info!("broadcaster listening on {addr} (max {max_clients} clients)");
        let _ = self.events.send(BroadcasterEvent::Listening(addr));

        let peers = self.peers.clone();
        let events = self.events.clone();
        self.acceptor = Some(Worker::spawn("broadcaster-accept", move |token| {
            accept_loop(listener, peers, events, max_clients, token)
        }));
        self.local_addr = Some(addr);
        Ok(addr)
    }

    /// Encode `sample` once and write it to every client.
    ///
    /// Clients whose write fails or times out are removed after the pass.
    /// Returns the number of clients that received the frame.
    pub async fn broadcast(&self, sample: &SampleVector) -> usize {
        let frame = self.codec.encode(sample);
        let mut peers = self.peers.lock().await;
        if peers.is_empty() {
            return 0;
        }

        let mut dead = Vec::new();
        for (i, peer) in peers.iter_mut().enumerate() {
            match tokio::time::timeout(self.write_timeout, peer.stream.write_all(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("write to {} failed: {e}", peer.addr);
                    dead.push(i);
                }
                Err(_) => {
                    warn!("write to {} timed out after {:?}", peer.addr, self.write_timeout);
                    dead.push(i);
                }
            }
        }

        let delivered = peers.len() - dead.len();
        for i in dead.into_iter().rev() {
            let peer = peers.remove(i);
            info!("client {} disconnected", peer.addr);
            let _ = self
                .events
                .send(BroadcasterEvent::ClientDisconnected(peer.addr));
        }
        drop(peers);

        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add((FRAME_LEN * delivered) as u64, Ordering::Relaxed);
        delivered
    }

    /// Stop the accept loop and close the listener, then close every client.
    ///
    /// Peers are drained only after the accept loop has exited, so no
    /// connection accepted during shutdown survives `stop`.
    pub async fn stop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.shutdown(JOIN_TIMEOUT).await;
        }

        let mut peers = self.peers.lock().await;
        let closed = peers.len();
        for mut peer in peers.drain(..) {
            let _ = peer.stream.shutdown().await;
            let _ = self
                .events
                .send(BroadcasterEvent::ClientDisconnected(peer.addr));
        }
        drop(peers);
        if self.local_addr.take().is_some() {
            info!("broadcaster stopped, {closed} clients closed");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    peers: PeerList,
    events: broadcast::Sender<BroadcasterEvent>,
    max_clients: usize,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed: {e}");
                let _ = events.send(BroadcasterEvent::Error(e.to_string()));
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };

        let mut list = peers.lock().await;
        if list.len() >= max_clients {
            warn!(
                "rejecting {addr}: {}",
                EegError::CapacityExceeded { max: max_clients }
            );
            drop(stream);
            let _ = events.send(BroadcasterEvent::ClientRejected(addr));
            continue;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay on {addr} failed: {e}");
        }
        list.push(Peer { addr, stream });
        info!("client {addr} connected ({} total)", list.len());
        let _ = events.send(BroadcasterEvent::ClientConnected(addr));
    }
    debug!("accept loop exited, listener closed");
}

// ── Tests ────────────────────────────────────────────────────────
