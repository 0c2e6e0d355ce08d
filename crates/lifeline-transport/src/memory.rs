//! In-memory transport for tests and simulations.
//!
//! [`pair`] yields a [`Transport`] wired to a [`MemoryHandle`] that plays
//! the role of the remote end: the handle scripts inbound events and
//! observes everything the transport sends.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::traits::{Transport, TransportEvent};

/// Remote end of an in-memory transport.
#[derive(Debug)]
pub struct MemoryHandle {
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryHandle {
    /// Deliver received bytes to the transport's consumer.
    pub fn deliver(&self, bytes: impl Into<Bytes>) {
        let _ = self.events.send(TransportEvent::Message(bytes.into()));
    }

    /// Push an arbitrary event to the transport's consumer.
    pub fn push(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Report the connection as closed.
    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }

    /// Next message the transport sent, or `None` once it is gone.
    pub async fn next_sent(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Non-blocking variant of [`MemoryHandle::next_sent`].
    pub fn try_next_sent(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }
}

/// Create a connected in-memory transport/handle pair.
pub fn pair() -> (Transport, MemoryHandle) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let transport = Transport::from_parts(out_tx, event_rx, cancel);
    let handle = MemoryHandle {
        events: event_tx,
        outbound: out_rx,
    };
    (transport, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_events_arrive_in_order() {
        let (mut transport, handle) = pair();

        handle.deliver("one");
        handle.deliver("two");
        handle.close();

        assert!(matches!(
            transport.next_event().await,
            Some(TransportEvent::Message(b)) if b.as_ref() == b"one"
        ));
        assert!(matches!(
            transport.next_event().await,
            Some(TransportEvent::Message(b)) if b.as_ref() == b"two"
        ));
        assert!(matches!(
            transport.next_event().await,
            Some(TransportEvent::Closed)
        ));
    }

    #[tokio::test]
    async fn sent_messages_are_observable() {
        let (transport, mut handle) = pair();

        transport.send(Bytes::from_static(b"out"));
        assert_eq!(handle.next_sent().await.unwrap().as_ref(), b"out");
    }

    #[tokio::test]
    async fn superseded_transport_delivers_nothing() {
        let (transport, mut handle) = pair();
        drop(transport);

        handle.deliver("ghost");
        assert!(handle.next_sent().await.is_none());
    }
}
