//! Byte-stream transport abstraction for lifeline sockets.
//!
//! A [`Transport`] is one underlying connection: a non-blocking binary send
//! plus an ordered stream of [`TransportEvent`]s. A [`Connector`] knows how
//! to produce a fresh transport on demand, which is the seam the reconnect
//! machinery drives.
//!
//! This is the lowest layer of lifeline. Everything else builds on top of
//! the handle types provided here.

pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{pair, MemoryHandle};
pub use tcp::TcpConnector;
pub use traits::{Connector, Transport, TransportEvent};
