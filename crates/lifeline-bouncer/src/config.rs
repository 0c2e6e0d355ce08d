use std::time::Duration;

/// Runtime configuration for the bouncer process.
#[derive(Debug, Clone)]
pub struct BouncerConfig {
    /// Address to accept lifeline clients on.
    pub listen: String,
    /// Upstream `host:port` each session relays to.
    pub upstream: String,
    /// Replay buffer limit per session, in bytes. Unacknowledged bytes
    /// past this are evicted oldest-first.
    pub buffer_limit: usize,
    /// Inactivity window after which a session is discarded.
    pub session_timeout: Duration,
    /// How often idle sessions are swept.
    pub sweep_interval: Duration,
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:12345".to_string(),
            upstream: "127.0.0.1:6666".to_string(),
            buffer_limit: 64 * 1024,
            session_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
        }
    }
}
