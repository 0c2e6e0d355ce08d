//! Reconnecting, session-resuming socket facade.
//!
//! This is the "just works" layer. A [`LifelineSocket`] looks like one
//! continuous connection to the application while transparently replacing
//! the underlying transport on failure: exponential-backoff reconnects,
//! a resume/ACK handshake after every successful connect, and a cumulative
//! received-byte count that survives any number of transport swaps.
//!
//! Reconnections are invisible above this layer: the open notification
//! fires once per logical session, and a terminal failure surfaces as a
//! single close (if the session ever opened) or error (if it never did).

pub mod error;
pub mod reconnect;
pub mod session;
pub mod socket;

pub use error::SocketError;
pub use lifeline_frame::ControlMessage;
pub use reconnect::{BackoffPolicy, Disposition, LinkState, ReconnectState};
pub use session::{ControlRouting, SessionPhase, SessionTracker};
pub use socket::{LifelineSocket, SocketConfig, SocketEvent, SocketEvents};
