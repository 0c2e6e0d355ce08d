use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};

/// Notification from an underlying connection.
///
/// An `Error` implies an imminent close; consumers must not rely on
/// receiving both.
#[derive(Debug)]
pub enum TransportEvent {
    /// A chunk of received bytes. Boundaries are arbitrary; framing is the
    /// caller's concern.
    Message(Bytes),
    /// The connection closed.
    Closed,
    /// The connection failed.
    Error(TransportError),
}

/// Produces a fresh [`Transport`] on demand.
///
/// `connect` resolving `Ok` is the open notification: the returned
/// transport is live and ready to carry traffic.
pub trait Connector: Send + Sync + 'static {
    /// Establish a new connection.
    fn connect(&self) -> impl std::future::Future<Output = Result<Transport>> + Send;
}

/// Handle to one underlying connection.
///
/// Exactly one transport is authoritative at a time; dropping a superseded
/// handle cancels its I/O tasks so it can no longer deliver events.
#[derive(Debug)]
pub struct Transport {
    outbound: mpsc::UnboundedSender<Bytes>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
}

impl Transport {
    /// Assemble a transport from its channel halves.
    ///
    /// Implementations push events into the paired sender and drain the
    /// paired outbound receiver; both sides observe `cancel` for teardown.
    pub fn from_parts(
        outbound: mpsc::UnboundedSender<Bytes>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            outbound,
            events,
            cancel,
        }
    }

    /// Queue a complete binary message for transmission.
    ///
    /// Non-blocking and fire-and-forget: once the connection is gone the
    /// message is dropped.
    pub fn send(&self, message: impl Into<Bytes>) {
        if self.outbound.send(message.into()).is_err() {
            tracing::trace!("send on closed transport dropped");
        }
    }

    /// Wait for the next event. Returns `None` once the transport is
    /// closed or cancelled; a closed transport never yields a buffered
    /// event, so a superseded connection cannot mutate state late.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Terminate the connection and stop its I/O tasks.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
