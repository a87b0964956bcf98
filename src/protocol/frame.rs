//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and raw payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing. Field-level decoding
//! against the registry happens in the codec layer; the frame only knows
//! about bytes.

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a frame from header and raw bytes (copies data).
    pub fn from_parts(header: Header, payload: &[u8]) -> Self {
        Self {
            header,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the class ID.
    #[inline]
    pub fn class_id(&self) -> u8 {
        self.header.class_id
    }

    /// Get the message ID within the class.
    #[inline]
    pub fn message_id(&self) -> u8 {
        self.header.message_id
    }

    /// Check if this is an event frame.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.header.is_event()
    }
}

/// Build a complete frame as a single byte vector.
///
/// Encodes the header and appends the payload into a contiguous buffer.
///
/// # Example
///
/// ```
/// use bglink::protocol::{build_frame, Header};
///
/// let header = Header::command(0x01, 0x00, 0);
/// let bytes = build_frame(&header, &[]);
/// assert_eq!(bytes, vec![0x00, 0x00, 0x01, 0x00]);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
