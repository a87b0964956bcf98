//! Codec module - field-level payload encoding and decoding.
//!
//! The frame layer (see [`crate::protocol`]) moves raw bytes; this layer
//! turns payload bytes into typed field values and back, driven entirely by
//! the registry's schemas. There is no per-message code: one generic walker
//! handles every command, response, and event in the dictionary.

mod fields;
mod payload;

pub use fields::{BdAddr, FieldType, FieldValue, MessageKind, ResultCode};
pub use payload::{
    decode_frame, decode_frame_as, decode_payload, encode_message, encode_payload, Message,
    MessageId,
};
