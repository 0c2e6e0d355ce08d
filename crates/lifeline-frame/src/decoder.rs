use bytes::BytesMut;

use crate::codec::{decode_frame, Frame};
use crate::error::{FrameError, Result};

/// Default cap on bytes buffered while waiting for a complete frame.
///
/// Comfortably above one maximum-size frame; anything past this indicates a
/// corrupt or hostile stream rather than a slow one.
pub const DEFAULT_MAX_PENDING: usize = 128 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Stateful frame accumulator for transports that deliver bytes at
/// arbitrary boundaries.
///
/// Push received chunks in, drain complete frames out. Incomplete trailing
/// bytes are retained until the rest of the frame arrives. The pending
/// buffer is bounded; exceeding the bound is a connection-fatal error.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_pending: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default pending-buffer limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_PENDING)
    }

    /// Create a decoder with an explicit pending-buffer limit.
    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_pending,
        }
    }

    /// Append a received chunk to the pending buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extract the next complete frame, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Fails with
    /// [`FrameError::PendingLimitExceeded`] if the incomplete remainder has
    /// outgrown the configured limit.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = decode_frame(&mut self.buf) {
            return Ok(Some(frame));
        }
        if self.buf.len() > self.max_pending {
            return Err(FrameError::PendingLimitExceeded {
                buffered: self.buf.len(),
                max: self.max_pending,
            });
        }
        Ok(None)
    }

    /// Bytes currently buffered awaiting a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
