//! Length-prefixed wire framing for lifeline sockets.
//!
//! Every message on the wire is framed with:
//! - A 1-byte frame type (`0x00` data, `0x01` control)
//! - A 2-byte big-endian payload length (max 65535)
//!
//! Data payloads larger than one frame are split into ordered chunks.
//! Control frames carry a JSON mapping ([`ControlMessage`]) used for the
//! session-resumption handshake.
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod control;
pub mod decoder;
pub mod error;
pub mod framed;

pub use codec::{
    decode_frame, encode_data_frames, encode_frame, Frame, FrameType, HEADER_SIZE, MAX_PAYLOAD,
};
pub use control::ControlMessage;
pub use decoder::{FrameDecoder, DEFAULT_MAX_PENDING};
pub use error::{FrameError, Result};
pub use framed::LifelineCodec;
