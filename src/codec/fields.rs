//! Field types and values for payload schemas.
//!
//! A payload is an ordered list of fields. All integers are little-endian
//! on the wire. `uint8array` (1 length byte + data) is the only
//! variable-length type and may only appear as the last field of a payload.

use std::fmt;

/// Whether a message travels host-to-device or device-to-host, and how.
///
/// On the wire a command and its response share the same header type bit;
/// they are distinguished by direction. The decoded representation keeps
/// them apart so `(class_id, message_id, kind)` uniquely identifies a
/// registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Host-to-device request.
    Command,
    /// Device's reply to a command.
    Response,
    /// Unsolicited device-to-host message.
    Event,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Command => write!(f, "command"),
            MessageKind::Response => write!(f, "response"),
            MessageKind::Event => write!(f, "event"),
        }
    }
}

/// Declared type of a single payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    /// Fixed-size opaque byte array (e.g. a 6-byte device address).
    ByteArray(usize),
    /// Length-prefixed byte array: 1 length byte + data.
    U8Array,
}

impl FieldType {
    /// Wire size of this field, or `None` for the variable-length type.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldType::U8 | FieldType::I8 => Some(1),
            FieldType::U16 | FieldType::I16 => Some(2),
            FieldType::U32 | FieldType::I32 => Some(4),
            FieldType::ByteArray(n) => Some(*n),
            FieldType::U8Array => None,
        }
    }

    /// Check if this is the variable-length type.
    pub fn is_variable(&self) -> bool {
        matches!(self, FieldType::U8Array)
    }
}

/// A decoded (or to-be-encoded) field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    /// Fixed-size opaque bytes.
    ByteArray(Vec<u8>),
    /// Length-prefixed bytes (the length byte is added on encode).
    U8Array(Vec<u8>),
}

impl FieldValue {
    /// Check that this value fits the declared type (including the exact
    /// size for fixed byte arrays).
    pub fn matches(&self, ty: &FieldType) -> bool {
        match (self, ty) {
            (FieldValue::U8(_), FieldType::U8) => true,
            (FieldValue::U16(_), FieldType::U16) => true,
            (FieldValue::U32(_), FieldType::U32) => true,
            (FieldValue::I8(_), FieldType::I8) => true,
            (FieldValue::I16(_), FieldType::I16) => true,
            (FieldValue::I32(_), FieldType::I32) => true,
            (FieldValue::ByteArray(bytes), FieldType::ByteArray(n)) => bytes.len() == *n,
            (FieldValue::U8Array(_), FieldType::U8Array) => true,
            _ => false,
        }
    }

    /// Number of bytes this value occupies on the wire.
    pub fn wire_size(&self) -> usize {
        match self {
            FieldValue::U8(_) | FieldValue::I8(_) => 1,
            FieldValue::U16(_) | FieldValue::I16(_) => 2,
            FieldValue::U32(_) | FieldValue::I32(_) => 4,
            FieldValue::ByteArray(bytes) => bytes.len(),
            FieldValue::U8Array(bytes) => 1 + bytes.len(),
        }
    }
}

/// A 6-byte Bluetooth device address, least significant byte first on the
/// wire (the transmission order used by the device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    /// Build from a wire-order byte slice; `None` unless exactly 6 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Wire-order bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    /// Conventional colon form, most significant byte first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

/// 16-bit status code carried in the leading `result` field of most
/// responses. `0x0000` is success; everything else is a device-defined
/// error. These are application data: the codec and engine never interpret
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultCode(pub u16);

impl ResultCode {
    pub const OK: ResultCode = ResultCode(0x0000);
    pub const INVALID_PARAMETER: ResultCode = ResultCode(0x0180);
    pub const WRONG_STATE: ResultCode = ResultCode(0x0181);
    pub const OUT_OF_MEMORY: ResultCode = ResultCode(0x0182);
    pub const NOT_IMPLEMENTED: ResultCode = ResultCode(0x0183);
    pub const NOT_CONNECTED: ResultCode = ResultCode(0x0186);
    pub const COMMAND_TOO_LONG: ResultCode = ResultCode(0x018A);

    /// Check for success.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}
