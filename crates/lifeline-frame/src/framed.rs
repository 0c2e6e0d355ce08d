use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame};
use crate::decoder::DEFAULT_MAX_PENDING;
use crate::error::FrameError;

/// `tokio_util::codec` adapter for driving a raw byte stream with
/// [`Frame`]s via `Framed`.
#[derive(Debug, Clone)]
pub struct LifelineCodec {
    max_pending: usize,
}

impl LifelineCodec {
    /// Create a codec with the default pending-buffer limit.
    pub fn new() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Create a codec with an explicit pending-buffer limit.
    pub fn with_limit(max_pending: usize) -> Self {
        Self { max_pending }
    }
}

impl Default for LifelineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LifelineCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = decode_frame(src) {
            return Ok(Some(frame));
        }
        if src.len() > self.max_pending {
            return Err(FrameError::PendingLimitExceeded {
                buffered: src.len(),
                max: self.max_pending,
            });
        }
        Ok(None)
    }
}

impl Encoder<Frame> for LifelineCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(frame.frame_type, &frame.payload, dst)
    }
}
