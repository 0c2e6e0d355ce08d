//! Behavior tests for the socket facade, driven by scripted in-memory
//! transports so every disconnect and control frame is deterministic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use lifeline_frame::{encode_frame, ControlMessage, FrameDecoder, FrameType};
use lifeline_socket::{BackoffPolicy, LifelineSocket, SocketConfig, SocketEvent, SocketError};
use lifeline_transport::{pair, Connector, MemoryHandle, Transport, TransportError};

/// Hands out fresh in-memory transports, shipping each remote handle to
/// the test; refuses once the budget is spent.
struct ChannelConnector {
    handles: mpsc::UnboundedSender<MemoryHandle>,
    remaining: Mutex<u32>,
}

impl Connector for ChannelConnector {
    async fn connect(&self) -> Result<Transport, TransportError> {
        {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                return Err(TransportError::Closed);
            }
            *remaining -= 1;
        }
        let (transport, handle) = pair();
        let _ = self.handles.send(handle);
        Ok(transport)
    }
}

fn connector(budget: u32) -> (ChannelConnector, mpsc::UnboundedReceiver<MemoryHandle>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelConnector {
            handles: tx,
            remaining: Mutex::new(budget),
        },
        rx,
    )
}

/// Records the (paused-clock) instant of every connect attempt, then fails.
struct FailingConnector {
    attempts: Arc<Mutex<Vec<tokio::time::Instant>>>,
}

impl Connector for FailingConnector {
    async fn connect(&self) -> Result<Transport, TransportError> {
        self.attempts.lock().unwrap().push(tokio::time::Instant::now());
        Err(TransportError::Closed)
    }
}

fn failing_connector() -> (FailingConnector, Arc<Mutex<Vec<tokio::time::Instant>>>) {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    (
        FailingConnector {
            attempts: attempts.clone(),
        },
        attempts,
    )
}

fn data_wire(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    encode_frame(FrameType::Data, payload, &mut buf).unwrap();
    buf.freeze()
}

fn control_wire(message: &ControlMessage) -> Bytes {
    let mut buf = BytesMut::new();
    encode_frame(FrameType::Control, &message.to_payload().unwrap(), &mut buf).unwrap();
    buf.freeze()
}

fn parse_frame(wire: Bytes) -> (FrameType, Bytes) {
    let mut decoder = FrameDecoder::new();
    decoder.push(&wire);
    let frame = decoder
        .next_frame()
        .unwrap()
        .expect("sent bytes should hold one complete frame");
    assert_eq!(decoder.pending(), 0, "driver sends exactly one frame per message");
    (frame.frame_type, frame.payload)
}

fn parse_control(wire: Bytes) -> ControlMessage {
    let (frame_type, payload) = parse_frame(wire);
    assert_eq!(frame_type, FrameType::Control);
    ControlMessage::from_payload(&payload).unwrap()
}

async fn no_more_events(events: &mut lifeline_socket::SocketEvents) {
    let quiet = tokio::time::timeout(Duration::from_millis(50), events.next()).await;
    assert!(quiet.is_err(), "expected no further events, got {quiet:?}");
}

#[tokio::test(start_paused = true)]
async fn open_fires_once_across_three_reconnect_cycles() {
    let (connector, mut handles) = connector(4);
    let (_socket, mut events) = LifelineSocket::connect(connector);

    for _ in 0..3 {
        let handle = handles.recv().await.unwrap();
        handle.close();
    }
    let _live = handles.recv().await.unwrap();

    let mut opens = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(50), events.next()).await {
            Ok(Some(SocketEvent::Open)) => opens += 1,
            Ok(Some(other)) => panic!("unexpected event: {other:?}"),
            Ok(None) | Err(_) => break,
        }
    }
    assert_eq!(opens, 1);
}

#[tokio::test(start_paused = true)]
async fn fresh_handshake_then_resume_with_token_and_ack() {
    let (connector, mut handles) = connector(2);
    let (socket, mut events) = LifelineSocket::connect(connector);
    let mut h1 = handles.recv().await.unwrap();

    // First traffic on a fresh session is an empty control request.
    let handshake = parse_control(h1.next_sent().await.unwrap());
    assert!(handshake.is_empty());

    assert!(matches!(events.next().await, Some(SocketEvent::Open)));

    // Server assigns a session and delivers 42 bytes.
    h1.deliver(control_wire(&ControlMessage::session("abc123")));
    h1.deliver(data_wire(&[7u8; 42]));

    assert!(matches!(
        events.next().await,
        Some(SocketEvent::Control(msg)) if msg.session.as_deref() == Some("abc123")
    ));
    assert!(matches!(
        events.next().await,
        Some(SocketEvent::Message(payload)) if payload.len() == 42
    ));

    // Each data frame is acknowledged immediately with the updated count.
    let ack = parse_control(h1.next_sent().await.unwrap());
    assert_eq!(ack.ack, Some(42));

    assert_eq!(socket.bytes_received(), 42);
    assert_eq!(socket.session_token().as_deref(), Some("abc123"));

    // Drop the transport; the replacement must resume, not start fresh.
    h1.close();
    let mut h2 = handles.recv().await.unwrap();

    let resume = parse_control(h2.next_sent().await.unwrap());
    assert_eq!(resume.resume.as_deref(), Some("abc123"));
    assert_eq!(resume.ack, Some(42));

    no_more_events(&mut events).await;
}

#[tokio::test(start_paused = true)]
async fn byte_count_is_monotonic_across_reconnects() {
    let (connector, mut handles) = connector(2);
    let (socket, mut events) = LifelineSocket::connect(connector);

    let mut h1 = handles.recv().await.unwrap();
    let _handshake = h1.next_sent().await.unwrap();
    h1.deliver(data_wire(&[1u8; 10]));
    assert!(matches!(events.next().await, Some(SocketEvent::Open)));
    assert!(matches!(events.next().await, Some(SocketEvent::Message(_))));
    assert_eq!(parse_control(h1.next_sent().await.unwrap()).ack, Some(10));

    h1.close();
    let mut h2 = handles.recv().await.unwrap();
    let _handshake = h2.next_sent().await.unwrap();

    h2.deliver(data_wire(&[2u8; 5]));
    h2.deliver(data_wire(&[3u8; 1]));
    assert!(matches!(events.next().await, Some(SocketEvent::Message(_))));
    assert!(matches!(events.next().await, Some(SocketEvent::Message(_))));

    assert_eq!(parse_control(h2.next_sent().await.unwrap()).ack, Some(15));
    assert_eq!(parse_control(h2.next_sent().await.unwrap()).ack, Some(16));
    assert_eq!(socket.bytes_received(), 16);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_before_open_reports_error_once() {
    let (connector, _handles) = connector(0);
    let (_socket, mut events) = LifelineSocket::connect(connector);

    match events.next().await {
        Some(SocketEvent::Error(SocketError::ReconnectExhausted { attempts })) => {
            assert_eq!(attempts, 20);
        }
        other => panic!("expected exhaustion error, got {other:?}"),
    }
    // Driver is done: the stream ends, with no close notification.
    assert!(events.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn exhaustion_after_open_reports_close_once() {
    let (connector, mut handles) = connector(1);
    let (_socket, mut events) = LifelineSocket::connect(connector);

    let handle = handles.recv().await.unwrap();
    assert!(matches!(events.next().await, Some(SocketEvent::Open)));
    handle.close();

    match events.next().await {
        Some(SocketEvent::Closed) => {}
        other => panic!("expected close after exhaustion, got {other:?}"),
    }
    assert!(events.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn peer_error_control_ends_session_without_reconnect() {
    let (connector, mut handles) = connector(5);
    let (_socket, mut events) = LifelineSocket::connect(connector);

    let h1 = handles.recv().await.unwrap();
    assert!(matches!(events.next().await, Some(SocketEvent::Open)));

    h1.deliver(control_wire(&ControlMessage::error("invalid session")));

    assert!(matches!(events.next().await, Some(SocketEvent::Closed)));
    // Driver exited immediately; no replacement transport was requested.
    assert!(events.next().await.is_none());
    assert!(handles.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn malformed_control_and_reserved_frames_are_dropped_not_fatal() {
    let (connector, mut handles) = connector(1);
    let (_socket, mut events) = LifelineSocket::connect(connector);

    let mut h1 = handles.recv().await.unwrap();
    let _handshake = h1.next_sent().await.unwrap();
    assert!(matches!(events.next().await, Some(SocketEvent::Open)));

    // Garbage control payload, then an unknown frame type.
    let mut bad_control = BytesMut::new();
    encode_frame(FrameType::Control, b"{not-json", &mut bad_control).unwrap();
    h1.deliver(bad_control.freeze());

    let mut reserved = BytesMut::new();
    encode_frame(FrameType::Reserved(0x7F), b"future", &mut reserved).unwrap();
    h1.deliver(reserved.freeze());

    // The connection stays up and data still flows.
    h1.deliver(data_wire(b"still alive"));
    assert!(matches!(
        events.next().await,
        Some(SocketEvent::Message(payload)) if payload.as_ref() == b"still alive"
    ));
    no_more_events(&mut events).await;
}

#[tokio::test(start_paused = true)]
async fn oversized_send_is_chunked_in_order() {
    let (connector, mut handles) = connector(1);
    let (socket, mut events) = LifelineSocket::connect(connector);

    let mut h1 = handles.recv().await.unwrap();
    let _handshake = h1.next_sent().await.unwrap();
    assert!(matches!(events.next().await, Some(SocketEvent::Open)));

    let payload: Vec<u8> = (0..70_000u32).map(|i| i as u8).collect();
    socket.send(payload.clone());

    let (t1, first) = parse_frame(h1.next_sent().await.unwrap());
    let (t2, second) = parse_frame(h1.next_sent().await.unwrap());
    assert_eq!(t1, FrameType::Data);
    assert_eq!(t2, FrameType::Data);
    assert_eq!(first.len(), 65_535);
    assert_eq!(second.len(), 70_000 - 65_535);

    let mut reassembled = Vec::new();
    reassembled.extend_from_slice(&first);
    reassembled.extend_from_slice(&second);
    assert_eq!(reassembled, payload);
}

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_is_dropped_not_queued() {
    let (connector, mut handles) = connector(2);
    let (socket, mut events) = LifelineSocket::connect(connector);

    let h1 = handles.recv().await.unwrap();
    assert!(matches!(events.next().await, Some(SocketEvent::Open)));
    h1.close();

    // Let the driver observe the close and enter backoff.
    tokio::time::sleep(Duration::from_millis(1)).await;
    socket.send("written into the void");

    let mut h2 = handles.recv().await.unwrap();
    let handshake = parse_control(h2.next_sent().await.unwrap());
    assert!(handshake.is_empty());

    // Nothing else was flushed after reconnect: the send was dropped.
    let quiet = tokio::time::timeout(Duration::from_millis(50), h2.next_sent()).await;
    assert!(quiet.is_err(), "dropped send must not be replayed");
}

#[tokio::test(start_paused = true)]
async fn backoff_delays_follow_the_schedule() {
    let (connector, attempts) = failing_connector();
    let config = SocketConfig {
        backoff: BackoffPolicy {
            max_attempts: 6,
            ..BackoffPolicy::default()
        },
        ..SocketConfig::default()
    };
    let (_socket, mut events) = LifelineSocket::connect_with_config(connector, config);

    match events.next().await {
        Some(SocketEvent::Error(SocketError::ReconnectExhausted { attempts })) => {
            assert_eq!(attempts, 6);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }

    let attempts = attempts.lock().unwrap();
    let gaps: Vec<u64> = attempts
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
        .collect();
    assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 16_000, 30_000]);
}

#[tokio::test(start_paused = true)]
async fn drop_cancels_a_pending_reconnect_timer() {
    let (connector, attempts) = failing_connector();
    let (socket, mut events) = LifelineSocket::connect(connector);

    // First attempt fails immediately; second fires after 1s. Stop partway
    // through the third backoff window.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let before = attempts.lock().unwrap().len();
    assert_eq!(before, 2);

    drop(socket);
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(attempts.lock().unwrap().len(), before, "timer fired after teardown");
    // Torn down by the owner: the stream just ends, no terminal event.
    assert!(events.next().await.is_none());
}
