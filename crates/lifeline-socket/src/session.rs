use lifeline_frame::ControlMessage;

/// Lifecycle of one logical session.
///
/// Distinguishes "never opened" from "closed after opening", which decides
/// whether a terminal failure is reported as an error or a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No transport has ever opened for this session.
    Fresh,
    /// A transport is live and the application has seen the open.
    ActiveOpen,
    /// The transport dropped; the session is still logically alive while
    /// reconnection runs.
    ActiveReconnecting,
    /// Fatally ended by the peer or by retry exhaustion. Terminal.
    Terminated,
}

/// How a parsed control message should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRouting {
    /// Routine metadata; pass it on to the application.
    Deliver,
    /// The peer fatally ended the session; do not reconnect.
    Fatal(String),
}

/// Session token and cumulative byte count for one logical session.
///
/// Persists across any number of transport replacements. `bytes_received`
/// only ever increases: it is the session-wide offset used for resumption,
/// never reset by a reconnect.
#[derive(Debug)]
pub struct SessionTracker {
    token: Option<String>,
    bytes_received: u64,
    phase: SessionPhase,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            token: None,
            bytes_received: 0,
            phase: SessionPhase::Fresh,
        }
    }

    /// The control message to send first on every freshly opened transport:
    /// resume with the held token and acknowledged offset, or request a new
    /// session.
    pub fn handshake(&self) -> ControlMessage {
        match &self.token {
            Some(token) => ControlMessage::resume(token.clone(), self.bytes_received),
            None => ControlMessage::fresh(),
        }
    }

    /// Account for a delivered data payload; returns the updated count.
    pub fn record_data(&mut self, len: usize) -> u64 {
        self.bytes_received += len as u64;
        self.bytes_received
    }

    /// Route an inbound control message: capture an assigned session token,
    /// detect a fatal session fault.
    pub fn apply(&mut self, message: &ControlMessage) -> ControlRouting {
        if let Some(token) = &message.session {
            self.token = Some(token.clone());
        }
        if let Some(reason) = &message.error {
            self.phase = SessionPhase::Terminated;
            return ControlRouting::Fatal(reason.clone());
        }
        ControlRouting::Deliver
    }

    /// A transport opened. Returns true exactly once per logical session:
    /// when the application should observe the open.
    pub fn mark_open(&mut self) -> bool {
        match self.phase {
            SessionPhase::Fresh => {
                self.phase = SessionPhase::ActiveOpen;
                true
            }
            SessionPhase::ActiveOpen | SessionPhase::ActiveReconnecting => {
                self.phase = SessionPhase::ActiveOpen;
                false
            }
            SessionPhase::Terminated => false,
        }
    }

    /// The transport dropped while the session is still logically alive.
    pub fn mark_reconnecting(&mut self) {
        if matches!(
            self.phase,
            SessionPhase::ActiveOpen | SessionPhase::ActiveReconnecting
        ) {
            self.phase = SessionPhase::ActiveReconnecting;
        }
    }

    /// Terminate the session (retry exhaustion).
    pub fn terminate(&mut self) {
        self.phase = SessionPhase::Terminated;
    }

    /// Whether the application has ever observed an open for this session.
    pub fn ever_opened(&self) -> bool {
        !matches!(self.phase, SessionPhase::Fresh)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_requests_new() {
        let tracker = SessionTracker::new();
        let handshake = tracker.handshake();
        assert!(handshake.is_empty());
        assert_eq!(handshake.to_payload().unwrap().as_ref(), b"{}");
    }

    #[test]
    fn resume_handshake_carries_token_and_offset() {
        let mut tracker = SessionTracker::new();
        tracker.apply(&ControlMessage::session("abc123"));
        tracker.record_data(40);
        tracker.record_data(2);

        let handshake = tracker.handshake();
        assert_eq!(handshake.resume.as_deref(), Some("abc123"));
        assert_eq!(handshake.ack, Some(42));
    }

    #[test]
    fn byte_count_is_monotonic_across_reconnects() {
        let mut tracker = SessionTracker::new();
        assert!(tracker.mark_open());
        tracker.record_data(10);

        tracker.mark_reconnecting();
        assert!(!tracker.mark_open());
        tracker.record_data(5);

        tracker.mark_reconnecting();
        assert!(!tracker.mark_open());
        tracker.record_data(1);

        assert_eq!(tracker.bytes_received(), 16);
    }

    #[test]
    fn open_fires_once_per_logical_session() {
        let mut tracker = SessionTracker::new();
        let opens = (0..4).filter(|_| tracker.mark_open()).count();
        assert_eq!(opens, 1);
    }

    #[test]
    fn error_control_terminates() {
        let mut tracker = SessionTracker::new();
        tracker.mark_open();

        let routing = tracker.apply(&ControlMessage::error("invalid session"));
        assert_eq!(routing, ControlRouting::Fatal("invalid session".to_string()));
        assert_eq!(tracker.phase(), SessionPhase::Terminated);
        assert!(!tracker.mark_open());
    }

    #[test]
    fn session_token_updates_on_reassignment() {
        let mut tracker = SessionTracker::new();
        tracker.apply(&ControlMessage::session("first"));
        tracker.apply(&ControlMessage::session("second"));
        assert_eq!(tracker.token(), Some("second"));
    }

    #[test]
    fn never_opened_is_distinguished() {
        let mut tracker = SessionTracker::new();
        assert!(!tracker.ever_opened());
        tracker.mark_open();
        assert!(tracker.ever_opened());
        tracker.mark_reconnecting();
        assert!(tracker.ever_opened());
    }
}
