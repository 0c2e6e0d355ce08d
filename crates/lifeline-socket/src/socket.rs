use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use lifeline_frame::{
    encode_data_frames, encode_frame, ControlMessage, Frame, FrameDecoder, FrameType,
    DEFAULT_MAX_PENDING, HEADER_SIZE,
};
use lifeline_transport::{Connector, Transport, TransportError, TransportEvent};

use crate::error::SocketError;
use crate::reconnect::{BackoffPolicy, Disposition, ReconnectState};
use crate::session::{ControlRouting, SessionTracker};

/// Tunables for a [`LifelineSocket`].
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Reconnect backoff schedule and attempt limit.
    pub backoff: BackoffPolicy,
    /// Cap on bytes buffered while waiting for a complete inbound frame.
    pub max_pending: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// Notification delivered to the application.
#[derive(Debug)]
pub enum SocketEvent {
    /// The logical session opened. Fires exactly once, regardless of how
    /// many transports it ends up spanning.
    Open,
    /// One delivered data frame. Chunked sends arrive as separate events;
    /// there is no cross-frame reassembly.
    Message(Bytes),
    /// A parsed control message that did not terminate the session.
    Control(ControlMessage),
    /// The session is over: closed by the peer or retries exhausted after
    /// it had opened.
    Closed,
    /// The session failed before it ever opened.
    Error(SocketError),
}

/// Receiving half of a [`LifelineSocket`]: an ordered stream of
/// [`SocketEvent`]s.
#[derive(Debug)]
pub struct SocketEvents {
    inner: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketEvents {
    /// Wait for the next event. Returns `None` once the session is over
    /// and all buffered events are drained.
    pub async fn next(&mut self) -> Option<SocketEvent> {
        self.inner.recv().await
    }
}

impl futures_core::Stream for SocketEvents {
    type Item = SocketEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<SocketEvent>> {
        self.get_mut().inner.poll_recv(cx)
    }
}

#[derive(Debug, Clone, Default)]
struct SessionInfo {
    bytes_received: u64,
    token: Option<String>,
}

enum Command {
    Send(Bytes),
    SendControl(ControlMessage),
    SendAck,
}

/// A socket that survives its transport.
///
/// Composes framing, session resumption, and backoff-driven reconnection
/// behind a socket-like surface; the application sees one continuous
/// logical connection. Commands are non-blocking and fire-and-forget:
/// while no transport is open they are dropped, not queued.
///
/// Dropping the socket (or calling [`close`](Self::close)) cancels the
/// driver task, including any backoff timer still pending.
#[derive(Debug)]
pub struct LifelineSocket {
    commands: mpsc::UnboundedSender<Command>,
    info: watch::Receiver<SessionInfo>,
    cancel: CancellationToken,
}

impl LifelineSocket {
    /// Start a socket with default configuration.
    ///
    /// Must be called within a tokio runtime; the driver task is spawned
    /// immediately and begins connecting.
    pub fn connect<C: Connector>(connector: C) -> (Self, SocketEvents) {
        Self::connect_with_config(connector, SocketConfig::default())
    }

    /// Start a socket with explicit configuration.
    pub fn connect_with_config<C: Connector>(
        connector: C,
        config: SocketConfig,
    ) -> (Self, SocketEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (info_tx, info_rx) = watch::channel(SessionInfo::default());
        let cancel = CancellationToken::new();

        let driver = Driver {
            connector,
            reconnect: ReconnectState::new(config.backoff.clone()),
            max_pending: config.max_pending,
            session: SessionTracker::new(),
            commands: commands_rx,
            events: events_tx,
            info: info_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(driver.run());

        (
            Self {
                commands: commands_tx,
                info: info_rx,
                cancel,
            },
            SocketEvents { inner: events_rx },
        )
    }

    /// Send application data, framed and chunked as needed.
    ///
    /// Dropped silently when no transport is open.
    pub fn send(&self, data: impl Into<Bytes>) {
        let _ = self.commands.send(Command::Send(data.into()));
    }

    /// Send a control message.
    pub fn send_control(&self, message: ControlMessage) {
        let _ = self.commands.send(Command::SendControl(message));
    }

    /// Acknowledge the cumulative byte count received so far.
    pub fn send_ack(&self) {
        let _ = self.commands.send(Command::SendAck);
    }

    /// Tear the session down, cancelling the driver and any pending
    /// reconnect timer.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Cumulative bytes received across the whole logical session.
    pub fn bytes_received(&self) -> u64 {
        self.info.borrow().bytes_received
    }

    /// The session token assigned by the peer, once one has arrived.
    pub fn session_token(&self) -> Option<String> {
        self.info.borrow().token.clone()
    }
}

impl Drop for LifelineSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum LinkEnd {
    /// The transport dropped; the session may still reconnect.
    Lost,
    /// The driver is done: cancelled, or the session ended for good.
    Stop,
}

/// Single thread of control for one logical session.
///
/// Owns every piece of mutable state; transitions are driven by transport
/// events, facade commands, and the backoff timer. No locking.
struct Driver<C> {
    connector: C,
    reconnect: ReconnectState,
    max_pending: usize,
    session: SessionTracker,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SocketEvent>,
    info: watch::Sender<SessionInfo>,
    cancel: CancellationToken,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        loop {
            // CONNECTING: keep requesting transports until one opens or
            // retries run out.
            let transport = loop {
                match self.try_connect().await {
                    Ok(Some(transport)) => break transport,
                    Ok(None) => return,
                    Err(err) => {
                        tracing::debug!(error = %err, "connect attempt failed");
                        match self.reconnect.on_disconnect() {
                            Disposition::Retry(delay) => {
                                if !self.backoff(delay).await {
                                    return;
                                }
                                self.reconnect.on_retry();
                            }
                            Disposition::GiveUp => {
                                self.emit_terminal();
                                return;
                            }
                        }
                    }
                }
            };

            // OPEN: pump the transport until it drops or the session ends.
            match self.drive(transport).await {
                LinkEnd::Stop => return,
                LinkEnd::Lost => {
                    self.session.mark_reconnecting();
                    match self.reconnect.on_disconnect() {
                        Disposition::Retry(delay) => {
                            if !self.backoff(delay).await {
                                return;
                            }
                            self.reconnect.on_retry();
                        }
                        Disposition::GiveUp => {
                            self.emit_terminal();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Request a new transport, servicing (and dropping) commands while
    /// the attempt is in flight.
    async fn try_connect(&mut self) -> Result<Option<Transport>, TransportError> {
        enum Step {
            Cancelled,
            Connected(Result<Transport, TransportError>),
            Command(Option<Command>),
        }

        let connect = self.connector.connect();
        tokio::pin!(connect);
        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                result = &mut connect => Step::Connected(result),
                command = self.commands.recv() => Step::Command(command),
            };
            match step {
                Step::Cancelled | Step::Command(None) => return Ok(None),
                Step::Connected(result) => return result.map(Some),
                Step::Command(Some(command)) => self.discard(command),
            }
        }
    }

    /// Wait out the backoff delay. Returns false if the socket was torn
    /// down first — the pending timer dies with it.
    async fn backoff(&mut self, delay: Duration) -> bool {
        enum Step {
            Cancelled,
            Elapsed,
            Command(Option<Command>),
        }

        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.reconnect.attempts(),
            "scheduling reconnect"
        );
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                () = &mut sleep => Step::Elapsed,
                command = self.commands.recv() => Step::Command(command),
            };
            match step {
                Step::Cancelled | Step::Command(None) => return false,
                Step::Elapsed => return true,
                Step::Command(Some(command)) => self.discard(command),
            }
        }
    }

    /// Pump one live transport.
    async fn drive(&mut self, mut transport: Transport) -> LinkEnd {
        enum Step {
            Cancelled,
            Command(Option<Command>),
            Event(Option<TransportEvent>),
        }

        self.reconnect.on_open();
        // Resume/new-session handshake goes out before any other traffic.
        self.send_control(&transport, &self.session.handshake());
        if self.session.mark_open() {
            let _ = self.events.send(SocketEvent::Open);
        }
        self.publish_info();

        let mut decoder = FrameDecoder::with_limit(self.max_pending);
        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                command = self.commands.recv() => Step::Command(command),
                event = transport.next_event() => Step::Event(event),
            };
            match step {
                Step::Cancelled | Step::Command(None) => {
                    transport.close();
                    return LinkEnd::Stop;
                }
                Step::Command(Some(command)) => self.execute(&transport, command),
                Step::Event(Some(TransportEvent::Message(bytes))) => {
                    if let Some(end) = self.on_bytes(&transport, &mut decoder, bytes) {
                        return end;
                    }
                }
                Step::Event(Some(TransportEvent::Closed)) | Step::Event(None) => {
                    tracing::debug!("transport closed");
                    return LinkEnd::Lost;
                }
                Step::Event(Some(TransportEvent::Error(err))) => {
                    tracing::debug!(error = %err, "transport error, treating as close");
                    transport.close();
                    return LinkEnd::Lost;
                }
            }
        }
    }

    fn execute(&self, transport: &Transport, command: Command) {
        match command {
            Command::Send(data) => {
                for frame in encode_data_frames(&data) {
                    transport.send(frame);
                }
            }
            Command::SendControl(message) => self.send_control(transport, &message),
            Command::SendAck => self.send_control(
                transport,
                &ControlMessage::ack(self.session.bytes_received()),
            ),
        }
    }

    fn discard(&self, command: Command) {
        match command {
            Command::Send(data) => {
                tracing::debug!(len = data.len(), "send while disconnected, data dropped");
            }
            Command::SendControl(_) | Command::SendAck => {
                tracing::debug!("control send while disconnected dropped");
            }
        }
    }

    fn send_control(&self, transport: &Transport, message: &ControlMessage) {
        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "control message failed to serialize, dropped");
                return;
            }
        };
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        match encode_frame(FrameType::Control, &payload, &mut buf) {
            Ok(()) => transport.send(buf.freeze()),
            Err(err) => tracing::warn!(error = %err, "control frame too large, dropped"),
        }
    }

    fn on_bytes(
        &mut self,
        transport: &Transport,
        decoder: &mut FrameDecoder,
        bytes: Bytes,
    ) -> Option<LinkEnd> {
        decoder.push(&bytes);
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    if let Some(end) = self.dispatch(transport, frame) {
                        return Some(end);
                    }
                }
                Ok(None) => return None,
                Err(err) => {
                    tracing::warn!(error = %err, "receive buffer overflow, dropping connection");
                    transport.close();
                    return Some(LinkEnd::Lost);
                }
            }
        }
    }

    fn dispatch(&mut self, transport: &Transport, frame: Frame) -> Option<LinkEnd> {
        match frame.frame_type {
            FrameType::Data => {
                let count = self.session.record_data(frame.payload.len());
                self.publish_info();
                let _ = self.events.send(SocketEvent::Message(frame.payload));
                // One ACK per delivered data frame, carrying the updated count.
                self.send_control(transport, &ControlMessage::ack(count));
                None
            }
            FrameType::Control => {
                let message = match ControlMessage::from_payload(&frame.payload) {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::warn!(error = %err, "malformed control payload dropped");
                        return None;
                    }
                };
                match self.session.apply(&message) {
                    ControlRouting::Fatal(reason) => {
                        tracing::warn!(%reason, "session terminated by peer");
                        let _ = self.events.send(SocketEvent::Closed);
                        transport.close();
                        Some(LinkEnd::Stop)
                    }
                    ControlRouting::Deliver => {
                        self.publish_info();
                        let _ = self.events.send(SocketEvent::Control(message));
                        None
                    }
                }
            }
            FrameType::Reserved(code) => {
                tracing::warn!(code, "ignoring frame with reserved type");
                None
            }
        }
    }

    fn emit_terminal(&mut self) {
        let attempts = self.reconnect.attempts();
        if self.session.ever_opened() {
            tracing::warn!(attempts, "reconnect attempts exhausted, closing session");
            let _ = self.events.send(SocketEvent::Closed);
        } else {
            tracing::warn!(attempts, "reconnect attempts exhausted before first open");
            let _ = self
                .events
                .send(SocketEvent::Error(SocketError::ReconnectExhausted {
                    attempts,
                }));
        }
        self.session.terminate();
    }

    fn publish_info(&self) {
        self.info.send_replace(SessionInfo {
            bytes_received: self.session.bytes_received(),
            token: self.session.token().map(String::from),
        });
    }
}
