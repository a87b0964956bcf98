//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the byte-level half of the protocol:
//! - 4-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//!
//! Field-level payload encoding lives in [`crate::codec`].

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    type_bits, Header, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, WIRE_MAX_PAYLOAD_LENGTH,
};
