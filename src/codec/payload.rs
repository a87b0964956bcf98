//! Schema-driven payload encoding and decoding.
//!
//! One generic encoding rule covers every message: walk the registry
//! entry's field list, read or write each field little-endian, and treat a
//! trailing `uint8array` as 1 length byte + data. Encode and decode are
//! mutual inverses for any message constructible from the registry.

use crate::codec::fields::{FieldType, FieldValue, MessageKind, ResultCode};
use crate::error::{BgError, Result};
use crate::protocol::{build_frame, type_bits, Frame, Header};
use crate::registry::{MessageRegistry, PayloadSchema};

/// Identity triple of a message: `(class_id, message_id, kind)`.
///
/// This is the key used for registry lookup and for correlating a response
/// to its originating command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub class: u8,
    pub id: u8,
    pub kind: MessageKind,
}

impl MessageId {
    /// Identity of a command.
    pub fn command(class: u8, id: u8) -> Self {
        Self {
            class,
            id,
            kind: MessageKind::Command,
        }
    }

    /// Identity of a response.
    pub fn response(class: u8, id: u8) -> Self {
        Self {
            class,
            id,
            kind: MessageKind::Response,
        }
    }

    /// Identity of an event.
    pub fn event(class: u8, id: u8) -> Self {
        Self {
            class,
            id,
            kind: MessageKind::Event,
        }
    }

    /// The response identity with the same class and message IDs.
    pub fn as_response(self) -> Self {
        Self::response(self.class, self.id)
    }
}

/// A fully decoded (or to-be-encoded) message: identity plus an ordered
/// list of typed field values matching the registry schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub fields: Vec<FieldValue>,
}

impl Message {
    /// Build a command message.
    pub fn command(class: u8, id: u8, fields: Vec<FieldValue>) -> Self {
        Self {
            id: MessageId::command(class, id),
            fields,
        }
    }

    /// Build a response message.
    pub fn response(class: u8, id: u8, fields: Vec<FieldValue>) -> Self {
        Self {
            id: MessageId::response(class, id),
            fields,
        }
    }

    /// Build an event message.
    pub fn event(class: u8, id: u8, fields: Vec<FieldValue>) -> Self {
        Self {
            id: MessageId::event(class, id),
            fields,
        }
    }

    /// Get a field by position.
    pub fn field(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index)
    }

    /// Read field `index` as a `u8`.
    pub fn u8_at(&self, index: usize) -> Result<u8> {
        match self.field(index) {
            Some(FieldValue::U8(v)) => Ok(*v),
            _ => Err(self.shape_error(index, "u8")),
        }
    }

    /// Read field `index` as a `u16`.
    pub fn u16_at(&self, index: usize) -> Result<u16> {
        match self.field(index) {
            Some(FieldValue::U16(v)) => Ok(*v),
            _ => Err(self.shape_error(index, "u16")),
        }
    }

    /// Read field `index` as a `u32`.
    pub fn u32_at(&self, index: usize) -> Result<u32> {
        match self.field(index) {
            Some(FieldValue::U32(v)) => Ok(*v),
            _ => Err(self.shape_error(index, "u32")),
        }
    }

    /// Read field `index` as an `i8`.
    pub fn i8_at(&self, index: usize) -> Result<i8> {
        match self.field(index) {
            Some(FieldValue::I8(v)) => Ok(*v),
            _ => Err(self.shape_error(index, "i8")),
        }
    }

    /// Read field `index` as an `i16`.
    pub fn i16_at(&self, index: usize) -> Result<i16> {
        match self.field(index) {
            Some(FieldValue::I16(v)) => Ok(*v),
            _ => Err(self.shape_error(index, "i16")),
        }
    }

    /// Read field `index` as a fixed byte array.
    pub fn bytes_at(&self, index: usize) -> Result<&[u8]> {
        match self.field(index) {
            Some(FieldValue::ByteArray(v)) => Ok(v),
            _ => Err(self.shape_error(index, "bytes")),
        }
    }

    /// Read field `index` as a length-prefixed byte array.
    pub fn u8array_at(&self, index: usize) -> Result<&[u8]> {
        match self.field(index) {
            Some(FieldValue::U8Array(v)) => Ok(v),
            _ => Err(self.shape_error(index, "u8array")),
        }
    }

    /// Read the leading `result` status word most responses carry.
    pub fn result_code(&self) -> Result<ResultCode> {
        Ok(ResultCode(self.u16_at(0)?))
    }

    fn shape_error(&self, index: usize, expected: &str) -> BgError {
        BgError::Usage(format!(
            "class 0x{:02x} id 0x{:02x}: field {} is not a {}",
            self.id.class, self.id.id, index, expected
        ))
    }
}

/// Encode field values against a schema.
///
/// # Errors
///
/// `FieldCountMismatch` / `FieldTypeMismatch` if the values do not line up
/// with the schema, `PayloadTooLong` if the variable tail exceeds the
/// message's remaining frame budget. Nothing is allocated on failure paths
/// beyond the error itself.
pub fn encode_payload(schema: &PayloadSchema, fields: &[FieldValue]) -> Result<Vec<u8>> {
    if fields.len() != schema.fields.len() {
        return Err(BgError::FieldCountMismatch {
            name: schema.name.clone(),
            expected: schema.fields.len(),
            actual: fields.len(),
        });
    }

    for (index, (field, value)) in schema.fields.iter().zip(fields).enumerate() {
        if !value.matches(&field.ty) {
            return Err(BgError::FieldTypeMismatch {
                name: schema.name.clone(),
                index,
                field: field.name.clone(),
            });
        }
        if let FieldValue::U8Array(data) = value {
            let budget = schema.variable_budget();
            if data.len() > budget {
                return Err(BgError::PayloadTooLong {
                    name: schema.name.clone(),
                    max: budget,
                    actual: data.len(),
                });
            }
        }
    }

    let mut buf = Vec::with_capacity(fields.iter().map(FieldValue::wire_size).sum());
    for value in fields {
        match value {
            FieldValue::U8(v) => buf.push(*v),
            FieldValue::U16(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FieldValue::U32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FieldValue::I8(v) => buf.push(*v as u8),
            FieldValue::I16(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FieldValue::I32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FieldValue::ByteArray(bytes) => buf.extend_from_slice(bytes),
            FieldValue::U8Array(data) => {
                buf.push(data.len() as u8);
                buf.extend_from_slice(data);
            }
        }
    }
    Ok(buf)
}

/// Decode a payload against a schema.
///
/// Enforces the length invariant in both directions: `Truncated` when the
/// payload runs out before the schema does, and a protocol error when
/// bytes are left over after the last field.
pub fn decode_payload(schema: &PayloadSchema, bytes: &[u8]) -> Result<Vec<FieldValue>> {
    let mut offset = 0usize;
    let mut out = Vec::with_capacity(schema.fields.len());

    for field in &schema.fields {
        let value = match field.ty {
            FieldType::U8 => FieldValue::U8(take(bytes, &mut offset, 1)?[0]),
            FieldType::I8 => FieldValue::I8(take(bytes, &mut offset, 1)?[0] as i8),
            FieldType::U16 => {
                let b = take(bytes, &mut offset, 2)?;
                FieldValue::U16(u16::from_le_bytes([b[0], b[1]]))
            }
            FieldType::I16 => {
                let b = take(bytes, &mut offset, 2)?;
                FieldValue::I16(i16::from_le_bytes([b[0], b[1]]))
            }
            FieldType::U32 => {
                let b = take(bytes, &mut offset, 4)?;
                FieldValue::U32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            FieldType::I32 => {
                let b = take(bytes, &mut offset, 4)?;
                FieldValue::I32(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            FieldType::ByteArray(n) => FieldValue::ByteArray(take(bytes, &mut offset, n)?.to_vec()),
            FieldType::U8Array => {
                let len = take(bytes, &mut offset, 1)?[0] as usize;
                FieldValue::U8Array(take(bytes, &mut offset, len)?.to_vec())
            }
        };
        out.push(value);
    }

    if offset != bytes.len() {
        return Err(BgError::Protocol(format!(
            "{}: {} trailing payload byte(s)",
            schema.name,
            bytes.len() - offset
        )));
    }

    Ok(out)
}

fn take<'a>(bytes: &'a [u8], offset: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = *offset + n;
    if end > bytes.len() {
        return Err(BgError::Truncated {
            expected: end,
            actual: bytes.len(),
        });
    }
    let slice = &bytes[*offset..end];
    *offset = end;
    Ok(slice)
}

/// Encode a full frame (header + payload) for a message.
///
/// Fails with `UnknownMessage` if the identity has no registry entry; all
/// payload errors are as in [`encode_payload`]. No bytes reach the
/// transport on any failure.
pub fn encode_message(
    registry: &MessageRegistry,
    msg: &Message,
    technology: u8,
) -> Result<Vec<u8>> {
    let schema = registry.schema(msg.id).ok_or(BgError::UnknownMessage {
        class: msg.id.class,
        id: msg.id.id,
        kind: msg.id.kind,
    })?;

    let payload = encode_payload(schema, &msg.fields)?;
    let message_type = match msg.id.kind {
        MessageKind::Event => type_bits::MESSAGE_TYPE_EVENT,
        _ => type_bits::MESSAGE_TYPE_COMMAND,
    };
    let header = Header::new(
        message_type,
        technology,
        payload.len() as u16,
        msg.id.class,
        msg.id.id,
    );
    Ok(build_frame(&header, &payload))
}

/// Decode an inbound frame with an explicit kind.
///
/// Must not panic on unknown frames: registries can version-skew between
/// host and device, so an absent entry is an error, not a bug.
pub fn decode_frame_as(
    registry: &MessageRegistry,
    frame: &Frame,
    kind: MessageKind,
) -> Result<Message> {
    let id = MessageId {
        class: frame.class_id(),
        id: frame.message_id(),
        kind,
    };
    let schema = registry.schema(id).ok_or(BgError::UnknownMessage {
        class: id.class,
        id: id.id,
        kind,
    })?;
    let fields = decode_payload(schema, frame.payload())?;
    Ok(Message { id, fields })
}

/// Decode an inbound frame as seen by the host: the event bit selects
/// `Event`, anything else is a `Response` (commands only travel outward).
pub fn decode_frame(registry: &MessageRegistry, frame: &Frame) -> Result<Message> {
    let kind = if frame.is_event() {
        MessageKind::Event
    } else {
        MessageKind::Response
    };
    decode_frame_as(registry, frame, kind)
}
