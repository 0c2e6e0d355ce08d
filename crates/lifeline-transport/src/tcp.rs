use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};
use crate::traits::{Connector, Transport, TransportEvent};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Connects fresh TCP transports to a fixed address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Create a connector for `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// The target address.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Transport> {
        let stream =
            TcpStream::connect(self.addr.as_str())
                .await
                .map_err(|source| TransportError::Connect {
                    addr: self.addr.clone(),
                    source,
                })?;
        tracing::debug!(addr = %self.addr, "tcp transport connected");
        Ok(spawn_stream_transport(stream))
    }
}

/// Wrap a connected stream in a [`Transport`], spawning its reader and
/// writer tasks.
pub fn spawn_stream_transport(stream: TcpStream) -> Transport {
    let (mut read_half, mut write_half) = stream.into_split();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<bytes::Bytes>();
    let cancel = CancellationToken::new();

    let reader_cancel = cancel.clone();
    let reader_events = event_tx.clone();
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        loop {
            buf.reserve(READ_CHUNK_SIZE);
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                read = read_half.read_buf(&mut buf) => match read {
                    Ok(0) => {
                        let _ = reader_events.send(TransportEvent::Closed);
                        break;
                    }
                    Ok(_) => {
                        let _ = reader_events.send(TransportEvent::Message(buf.split().freeze()));
                    }
                    Err(err) => {
                        let _ = reader_events.send(TransportEvent::Error(err.into()));
                        break;
                    }
                },
            }
        }
    });

    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                message = out_rx.recv() => match message {
                    Some(bytes) => {
                        let write = async {
                            write_half.write_all(&bytes).await?;
                            write_half.flush().await
                        };
                        if let Err(err) = write.await {
                            let _ = event_tx.send(TransportEvent::Error(err.into()));
                            writer_cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    Transport::from_parts(out_tx, event_rx, cancel)
}
