//! Session-resuming bouncer for lifeline clients.
//!
//! Sits between flaky clients and a single upstream service. Each logical
//! session owns one upstream connection and a bounded replay buffer of
//! recent upstream bytes; a client that drops and reconnects resumes its
//! session by token and is replayed everything past its acknowledged byte
//! offset, so the upstream never notices the interruption.

pub mod config;
pub mod error;
pub mod replay;
pub mod server;
mod session;

pub use config::BouncerConfig;
pub use error::{BouncerError, Result};
pub use replay::ReplayBuffer;
pub use server::Bouncer;
