//! Wire format encoding and decoding.
//!
//! Implements the 4-byte header format:
//! ```text
//! ┌─────────────────────────────┬───────────┬──────────┬────────────┐
//! │ type(1) tech(4) len_hi(3)   │ len_lo    │ class_id │ message_id │
//! │ 1 byte                      │ 1 byte    │ 1 byte   │ 1 byte     │
//! └─────────────────────────────┴───────────┴──────────┴────────────┘
//! ```
//!
//! Byte 0 packs the message type (bit 7), the technology type sharing the
//! transport (bits 3..=6) and the high 3 bits of the 11-bit payload length.
//! Byte 1 carries the low 8 bits of the payload length. On the wire a
//! command and its response carry the same type bit; they are told apart by
//! direction, not by the header.

use crate::error::{BgError, Result};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Maximum size of a whole frame, header included.
pub const MAX_FRAME_SIZE: usize = 260;

/// Declared maximum payload for any registry entry.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// Largest payload length the 11-bit header field can express.
pub const WIRE_MAX_PAYLOAD_LENGTH: u16 = 0x07FF;

/// Bit assignments within header byte 0.
pub mod type_bits {
    /// Message type mask (bit 7).
    pub const MESSAGE_TYPE_MASK: u8 = 0x80;
    /// Command on the way out, response on the way back.
    pub const MESSAGE_TYPE_COMMAND: u8 = 0x00;
    /// Unsolicited device-to-host event.
    pub const MESSAGE_TYPE_EVENT: u8 = 0x80;

    /// Technology type mask (bits 3..=6).
    pub const TECHNOLOGY_MASK: u8 = 0x78;
    /// Shift for the technology type bits.
    pub const TECHNOLOGY_SHIFT: u8 = 3;
    /// The Bluetooth stack.
    pub const TECHNOLOGY_BLUETOOTH: u8 = 0x00;

    /// High 3 bits of the payload length (bits 0..=2).
    pub const LENGTH_HIGH_MASK: u8 = 0x07;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message type bit, `MESSAGE_TYPE_COMMAND` or `MESSAGE_TYPE_EVENT`.
    pub message_type: u8,
    /// Technology type (0..=15), identifies the stack sharing the transport.
    pub technology: u8,
    /// Number of payload bytes following the header (0..=2047).
    pub payload_length: u16,
    /// Class the message belongs to (e.g. system, gap, gatt).
    pub class_id: u8,
    /// Message within its class.
    pub message_id: u8,
}

impl Header {
    /// Create a new header.
    pub fn new(
        message_type: u8,
        technology: u8,
        payload_length: u16,
        class_id: u8,
        message_id: u8,
    ) -> Self {
        Self {
            message_type,
            technology,
            payload_length,
            class_id,
            message_id,
        }
    }

    /// Create a command header for the Bluetooth technology type.
    pub fn command(class_id: u8, message_id: u8, payload_length: u16) -> Self {
        Self::new(
            type_bits::MESSAGE_TYPE_COMMAND,
            type_bits::TECHNOLOGY_BLUETOOTH,
            payload_length,
            class_id,
            message_id,
        )
    }

    /// Create an event header for the Bluetooth technology type.
    pub fn event(class_id: u8, message_id: u8, payload_length: u16) -> Self {
        Self::new(
            type_bits::MESSAGE_TYPE_EVENT,
            type_bits::TECHNOLOGY_BLUETOOTH,
            payload_length,
            class_id,
            message_id,
        )
    }

    /// Encode header to its 4 wire bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use bglink::protocol::Header;
    ///
    /// // system_hello: command, zero payload, class 0x01, message 0x00
    /// let header = Header::command(0x01, 0x00, 0);
    /// assert_eq!(header.encode(), [0x00, 0x00, 0x01, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        [
            (self.message_type & type_bits::MESSAGE_TYPE_MASK)
                | ((self.technology << type_bits::TECHNOLOGY_SHIFT) & type_bits::TECHNOLOGY_MASK)
                | ((self.payload_length >> 8) as u8 & type_bits::LENGTH_HIGH_MASK),
            (self.payload_length & 0xFF) as u8,
            self.class_id,
            self.message_id,
        ]
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if the buffer is shorter than 4 bytes. Content is not
    /// validated here; see [`Header::validate`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            message_type: buf[0] & type_bits::MESSAGE_TYPE_MASK,
            technology: (buf[0] & type_bits::TECHNOLOGY_MASK) >> type_bits::TECHNOLOGY_SHIFT,
            payload_length: (((buf[0] & type_bits::LENGTH_HIGH_MASK) as u16) << 8) | buf[1] as u16,
            class_id: buf[2],
            message_id: buf[3],
        })
    }

    /// Validate the header against a payload cap.
    ///
    /// The wire can express lengths up to 2047 but every registry entry is
    /// further bounded; the frame layer rejects anything over the cap before
    /// buffering the payload.
    pub fn validate(&self, max_payload_size: usize) -> Result<()> {
        if self.payload_length as usize > max_payload_size {
            return Err(BgError::Protocol(format!(
                "payload length {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }

    /// Check if this is an event frame.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.message_type == type_bits::MESSAGE_TYPE_EVENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::command(0x09, 0x09, 17);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_system_hello_exact_bytes() {
        let header = Header::command(0x01, 0x00, 0);
        assert_eq!(header.encode(), [0x00, 0x00, 0x01, 0x00]);

        let decoded = Header::decode(&[0x00, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(decoded, header);
        assert!(!decoded.is_event());
    }

    #[test]
    fn test_event_type_bit() {
        let header = Header::event(0x08, 0x00, 10);
        let bytes = header.encode();
        assert_eq!(bytes[0] & type_bits::MESSAGE_TYPE_MASK, 0x80);
        assert!(Header::decode(&bytes).unwrap().is_event());
    }

    #[test]
    fn test_eleven_bit_length_split() {
        // 0x1FF = 511: high bits land in byte 0, low byte in byte 1
        let header = Header::command(0x01, 0x00, 0x1FF);
        let bytes = header.encode();
        assert_eq!(bytes[0] & type_bits::LENGTH_HIGH_MASK, 0x01);
        assert_eq!(bytes[1], 0xFF);
        assert_eq!(Header::decode(&bytes).unwrap().payload_length, 0x1FF);
    }

    #[test]
    fn test_max_wire_length() {
        let header = Header::event(0x01, 0x00, WIRE_MAX_PAYLOAD_LENGTH);
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded.payload_length, WIRE_MAX_PAYLOAD_LENGTH);
    }

    #[test]
    fn test_technology_bits() {
        let header = Header::new(type_bits::MESSAGE_TYPE_COMMAND, 0x05, 0, 0x01, 0x00);
        let bytes = header.encode();
        assert_eq!(bytes[0] & type_bits::TECHNOLOGY_MASK, 0x05 << 3);
        assert_eq!(Header::decode(&bytes).unwrap().technology, 0x05);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[0x00, 0x00, 0x01]).is_none());
        assert!(Header::decode(&[]).is_none());
    }

    #[test]
    fn test_validate_payload_cap() {
        let header = Header::event(0x01, 0x00, 300);
        assert!(header.validate(MAX_PAYLOAD_SIZE).is_err());
        assert!(header.validate(512).is_ok());
    }

    #[test]
    fn test_class_and_message_position() {
        let header = Header::command(0xAB, 0xCD, 0);
        let bytes = header.encode();
        assert_eq!(bytes[2], 0xAB);
        assert_eq!(bytes[3], 0xCD);
    }
}
