/// Errors that can occur while running the bouncer.
#[derive(Debug, thiserror::Error)]
pub enum BouncerError {
    /// Failed to bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),
}

pub type Result<T> = std::result::Result<T, BouncerError>;
