use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Control frame payload: a JSON mapping with optional keys.
///
/// Keys are emitted only when present; unknown inbound keys are tolerated
/// and ignored. This type is the single place the wire encoding of control
/// metadata is decided, so a format change stays out of the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Session token the client asks to continue (client → server).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<String>,

    /// Cumulative count of bytes received so far (client → server).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,

    /// Session token assigned or confirmed by the server (server → client).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Fatal, non-retryable session fault (server → client).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlMessage {
    /// An empty message, requesting a fresh session.
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Request continuation of a session from the acknowledged byte offset.
    pub fn resume(token: impl Into<String>, ack: u64) -> Self {
        Self {
            resume: Some(token.into()),
            ack: Some(ack),
            ..Self::default()
        }
    }

    /// Acknowledge the cumulative byte count received so far.
    pub fn ack(count: u64) -> Self {
        Self {
            ack: Some(count),
            ..Self::default()
        }
    }

    /// Assign or confirm a session token.
    pub fn session(token: impl Into<String>) -> Self {
        Self {
            session: Some(token.into()),
            ..Self::default()
        }
    }

    /// Signal a fatal session fault.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// True if no recognized key is present.
    pub fn is_empty(&self) -> bool {
        self.resume.is_none() && self.ack.is_none() && self.session.is_none() && self.error.is_none()
    }

    /// Serialize to a control frame payload.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Parse a control frame payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
