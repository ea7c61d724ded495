//! Integration tests: generator to receiver over real localhost sockets,
//! client limits, reconnect behaviour and the WebSocket re-publish path,
//! including WebSocket reconnect and exhaustion.

use std::time::Duration;

use eeg_core::{
    Broadcaster, BroadcasterEvent, ClientEvent, ClientState, FrameCodec, ReconnectPolicy,
    RingBuffer, SampleVector, SignalGenerator, SyntheticSource, TcpClient, WsClient,
};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

// ── Helpers ──────────────────────────────────────────────────────

async fn wait_for_clients(b: &Broadcaster, n: usize) {
    for _ in 0..400 {
        if b.client_count().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {n} clients, have {}", b.client_count().await);
}

/// Next event matching `pred`, failing after five seconds.
async fn next_matching(
    events: &mut broadcast::Receiver<ClientEvent>,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(ev) if pred(&ev) => return ev,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timeout waiting for event")
}

fn quick_policy(interval_ms: u64) -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        interval: Duration::from_millis(interval_ms),
        max_attempts: 10,
    }
}

// ── End to end ───────────────────────────────────────────────────

#[tokio::test]
async fn test_generator_to_receiver() {
    let mut broadcaster = Broadcaster::default();
    let addr = broadcaster.start("127.0.0.1", 0, 5).await.unwrap();

    let mut client = TcpClient::with_policy(ReconnectPolicy::disabled());
    let mut events = client.subscribe();
    client.connect("127.0.0.1", addr.port()).await.unwrap();
    wait_for_clients(&broadcaster, 1).await;

    let (tx, mut rx) = mpsc::channel(256);
    let mut generator = SignalGenerator::new(SyntheticSource::default(), 250.0);
    generator.start(tx);

    let mut sent = Vec::new();
    while sent.len() < 50 {
        let sample = rx.recv().await.unwrap();
        assert_eq!(broadcaster.broadcast(&sample).await, 1);
        sent.push(sample);
    }
    generator.stop().await;

    let buffer = RingBuffer::new(1000);
    let mut received = Vec::new();
    while received.len() < sent.len() {
        if let ClientEvent::Data(s) =
            next_matching(&mut events, |ev| matches!(ev, ClientEvent::Data(_))).await
        {
            buffer.push(&s);
            received.push(s);
        }
    }

    let eps = FrameCodec::default().quantum();
    for (a, b) in sent.iter().zip(&received) {
        for (x, y) in a.values().zip(b.values()) {
            assert!((x - y).abs() <= eps, "{x} vs {y}");
        }
    }
    assert_eq!(buffer.len(), 50);

    client.disconnect().await;
    broadcaster.stop().await;
}

// ── Client limit ─────────────────────────────────────────────────

#[tokio::test]
async fn test_third_client_is_rejected() {
    let mut broadcaster = Broadcaster::default();
    let mut events = broadcaster.subscribe();
    let addr = broadcaster.start("127.0.0.1", 0, 2).await.unwrap();

    let _a = TcpStream::connect(addr).await.unwrap();
    let _b = TcpStream::connect(addr).await.unwrap();
    wait_for_clients(&broadcaster, 2).await;

    let mut c = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 8];
    let read = tokio::time::timeout(Duration::from_secs(2), c.read(&mut buf))
        .await
        .expect("rejected socket was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_eq!(broadcaster.client_count().await, 2);

    let mut rejected = false;
    while let Ok(ev) = events.try_recv() {
        rejected |= matches!(ev, BroadcasterEvent::ClientRejected(_));
    }
    assert!(rejected);

    // Frames still reach the two admitted clients.
    assert_eq!(broadcaster.broadcast(&SampleVector::default()).await, 2);
    broadcaster.stop().await;
}

// ── Reconnect ────────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnect_exhaustion_is_terminal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = TcpClient::with_policy(quick_policy(10));
    let mut events = client.subscribe();
    assert!(client.connect("127.0.0.1", port).await.is_err());

    let mut attempts = Vec::new();
    loop {
        match next_matching(&mut events, |_| true).await {
            ClientEvent::ReconnectAttempt { attempt, max } => {
                assert_eq!(max, 10);
                attempts.push(attempt);
            }
            ClientEvent::Error(msg) if msg.contains("10 attempts") => break,
            _ => {}
        }
    }
    assert_eq!(attempts, (1..=10).collect::<Vec<_>>());
    assert_eq!(client.state(), ClientState::Failed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(ev) = events.try_recv() {
        assert!(!matches!(ev, ClientEvent::ReconnectAttempt { .. }));
    }
}

#[tokio::test]
async fn test_reconnect_after_server_restart() {
    let mut broadcaster = Broadcaster::default();
    let addr = broadcaster.start("127.0.0.1", 0, 5).await.unwrap();

    let mut client = TcpClient::with_policy(quick_policy(100));
    let mut events = client.subscribe();
    client.connect("127.0.0.1", addr.port()).await.unwrap();
    wait_for_clients(&broadcaster, 1).await;

    broadcaster.stop().await;
    next_matching(&mut events, |ev| matches!(ev, ClientEvent::Disconnected)).await;
    next_matching(&mut events, |ev| {
        matches!(ev, ClientEvent::ReconnectAttempt { attempt: 1, .. })
    })
    .await;

    broadcaster.start("127.0.0.1", addr.port(), 5).await.unwrap();
    next_matching(&mut events, |ev| matches!(ev, ClientEvent::Connected(_))).await;
    assert!(client.is_connected());
    wait_for_clients(&broadcaster, 1).await;

    broadcaster
        .broadcast(&SampleVector::from_slices(&[5.0], &[]))
        .await;
    let ev = next_matching(&mut events, |ev| matches!(ev, ClientEvent::Data(_))).await;
    if let ClientEvent::Data(s) = ev {
        assert!((s.channels[0] - 5.0).abs() <= FrameCodec::default().quantum());
    }

    client.disconnect().await;
    broadcaster.stop().await;
}

// ── WebSocket ────────────────────────────────────────────────────

#[tokio::test]
async fn test_websocket_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Echo peer: returns every text frame, then one non-JSON line.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(msg)) = ws.next().await {
            ws.send(msg).await.unwrap();
            ws.send(tokio_tungstenite::tungstenite::Message::text("hello".to_string()))
                .await
                .unwrap();
        }
        // Hold the socket until the client closes it.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = tokio::task::spawn_blocking(move || {
        let mut client = WsClient::with_policy(ReconnectPolicy::disabled());
        client.connect("127.0.0.1", port).map(|_| client)
    })
    .await
    .unwrap()
    .unwrap();
    assert!(client.is_connected());

    let mut events = client.subscribe();
    let sample = SampleVector::from_slices(&[12.5, -3.0], &[1.0, 0.0]);
    client.send(&sample).unwrap();

    let echoed = next_matching(&mut events, |ev| matches!(ev, ClientEvent::Message(_))).await;
    let ClientEvent::Message(value) = echoed else {
        unreachable!()
    };
    assert_eq!(value["channels"][0], 12.5);
    assert_eq!(value["channels"][1], -3.0);
    assert_eq!(value["labels"][0], 1.0);
    assert!(value["timestamp"].is_string());

    let raw = next_matching(&mut events, |ev| matches!(ev, ClientEvent::Message(_))).await;
    let ClientEvent::Message(value) = raw else {
        unreachable!()
    };
    assert_eq!(value["raw"], "hello");

    let client = tokio::task::spawn_blocking(move || {
        let mut client = client;
        client.disconnect();
        client
    })
    .await
    .unwrap();
    assert_eq!(client.state(), ClientState::Disconnected);
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
}

#[tokio::test]
async fn test_websocket_reconnect_after_peer_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (restart_tx, restart_rx) = tokio::sync::oneshot::channel::<()>();

    // First peer drops right after the handshake and stops listening. The
    // second one comes up on the same port when told to.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(listener);
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        restart_rx.await.unwrap();
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let first = ws.next().await.unwrap().unwrap();
        first.to_text().unwrap().to_owned()
    });

    let client = WsClient::with_policy(quick_policy(100));
    let mut events = client.subscribe();
    let client = tokio::task::spawn_blocking(move || {
        let mut client = client;
        client.connect("127.0.0.1", port).map(|_| client)
    })
    .await
    .unwrap()
    .unwrap();

    next_matching(&mut events, |ev| matches!(ev, ClientEvent::Disconnected)).await;
    next_matching(&mut events, |ev| {
        matches!(ev, ClientEvent::ReconnectAttempt { attempt: 1, .. })
    })
    .await;
    assert!(!client.is_connected());

    restart_tx.send(()).unwrap();
    next_matching(&mut events, |ev| matches!(ev, ClientEvent::Connected(_))).await;
    assert!(client.is_connected());
    client
        .send(&SampleVector::from_slices(&[7.5], &[]))
        .unwrap();

    let text = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["channels"][0], 7.5);

    let client = tokio::task::spawn_blocking(move || {
        let mut client = client;
        client.disconnect();
        client
    })
    .await
    .unwrap();
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[tokio::test]
async fn test_websocket_reconnect_exhaustion_is_terminal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = WsClient::with_policy(quick_policy(10));
    let mut events = client.subscribe();
    let (client, first) = tokio::task::spawn_blocking(move || {
        let mut client = client;
        let first = client.connect("127.0.0.1", port);
        (client, first)
    })
    .await
    .unwrap();
    assert!(first.is_err());

    let mut attempts = Vec::new();
    loop {
        match next_matching(&mut events, |_| true).await {
            ClientEvent::ReconnectAttempt { attempt, max } => {
                assert_eq!(max, 10);
                attempts.push(attempt);
            }
            ClientEvent::Error(msg) if msg.contains("10 attempts") => break,
            _ => {}
        }
    }
    assert_eq!(attempts, (1..=10).collect::<Vec<_>>());
    assert_eq!(client.state(), ClientState::Failed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(ev) = events.try_recv() {
        assert!(!matches!(ev, ClientEvent::ReconnectAttempt { .. }));
    }
    assert!(matches!(
        client.send(&SampleVector::default()),
        Err(eeg_core::EegError::NotConnected)
    ));
}
