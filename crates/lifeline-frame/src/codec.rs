use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: type (1) + length (2) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Maximum payload of a single frame (length field is an unsigned 16-bit).
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

const TYPE_DATA: u8 = 0x00;
const TYPE_CONTROL: u8 = 0x01;

/// Kind of traffic a frame carries.
///
/// Wire values other than data/control are reserved; they decode as
/// [`FrameType::Reserved`] and callers decide how to treat them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Opaque application payload.
    Data,
    /// Protocol metadata (session/resume/ack/error).
    Control,
    /// Any other wire value, kept for forward compatibility.
    Reserved(u8),
}

impl FrameType {
    /// Classify a wire type byte.
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            TYPE_DATA => FrameType::Data,
            TYPE_CONTROL => FrameType::Control,
            other => FrameType::Reserved(other),
        }
    }

    /// The wire type byte for this frame type.
    pub fn to_wire(self) -> u8 {
        match self {
            FrameType::Data => TYPE_DATA,
            FrameType::Control => TYPE_CONTROL,
            FrameType::Reserved(byte) => byte,
        }
    }
}

/// A self-delimiting unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The kind of traffic this frame carries.
    pub frame_type: FrameType,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a data frame.
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: FrameType::Data,
            payload: payload.into(),
        }
    }

    /// Create a control frame from an already-serialized payload.
    pub fn control(payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: FrameType::Control,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a single frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬────────────────┬──────────────────┐
/// │ Type (1B) │ Length (2B BE) │ Payload          │
/// │ 0x00/0x01 │ 0..65535       │ (Length bytes)   │
/// └───────────┴────────────────┴──────────────────┘
/// ```
pub fn encode_frame(frame_type: FrameType, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(frame_type.to_wire());
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a data payload of any size into the minimum number of ordered
/// wire frames, each carrying at most [`MAX_PAYLOAD`] bytes.
///
/// Byte order is preserved across chunks. An empty payload yields one
/// empty-payload frame.
pub fn encode_data_frames(payload: &[u8]) -> Vec<Bytes> {
    let mut frames = Vec::with_capacity(payload.len() / MAX_PAYLOAD + 1);
    let mut rest = payload;
    loop {
        let take = rest.len().min(MAX_PAYLOAD);
        let (chunk, tail) = rest.split_at(take);
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + take);
        buf.put_u8(FrameType::Data.to_wire());
        buf.put_u16(take as u16);
        buf.put_slice(chunk);
        frames.push(buf.freeze());
        rest = tail;
        if rest.is_empty() {
            break;
        }
    }
    frames
}

/// Decode a frame from a buffer.
///
/// Returns `None` if the buffer doesn't contain a complete frame yet; the
/// buffer is left untouched in that case. On success, consumes the frame
/// bytes from the buffer. A frame is never yielded before its declared
/// payload is fully buffered.
pub fn decode_frame(src: &mut BytesMut) -> Option<Frame> {
    if src.len() < HEADER_SIZE {
        return None; // Need more data
    }

    let length = u16::from_be_bytes([src[1], src[2]]) as usize;
    if src.len() < HEADER_SIZE + length {
        return None; // Need more data
    }

    let frame_type = FrameType::from_wire(src[0]);
    src.advance(HEADER_SIZE);
    let payload = src.split_to(length).freeze();

    Some(Frame {
        frame_type,
        payload,
    })
}
