/// Errors surfaced to the application through the event stream.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SocketError {
    /// Every reconnect attempt failed before the session ever opened.
    #[error("gave up after {attempts} failed reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}
