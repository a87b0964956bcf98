//! Message registry built from a declarative data dictionary.
//!
//! The registry is the single source of truth for payload shapes: a
//! read-only table keyed by `(class_id, message_id, kind)` carrying the
//! display name and ordered field schema of every known command, response
//! and event. It is loaded from a JSON dictionary rather than hand-written
//! code, so adding a message is a data change, not a logic change.
//!
//! The embedded dictionary covers the Bluetooth classes; a custom one can
//! be supplied through [`MessageRegistry::from_json`] (useful for testing
//! version skew between host and device).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde::Deserialize;

use crate::codec::{FieldType, MessageId, MessageKind};
use crate::error::{BgError, Result};
use crate::protocol::{HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};

/// Well-known class IDs of the embedded Bluetooth dictionary.
pub mod classes {
    pub const DFU: u8 = 0x00;
    pub const SYSTEM: u8 = 0x01;
    pub const LE_GAP: u8 = 0x03;
    pub const LE_CONNECTION: u8 = 0x08;
    pub const GATT: u8 = 0x09;
    pub const GATT_SERVER: u8 = 0x0A;
    pub const SM: u8 = 0x0F;
}

/// A single field of a payload schema.
#[derive(Debug, Clone)]
pub struct Field {
    /// Field name from the dictionary.
    pub name: String,
    /// Declared wire type.
    pub ty: FieldType,
}

/// Ordered field schema of one message payload.
#[derive(Debug, Clone)]
pub struct PayloadSchema {
    /// Full display name, e.g. `system_hello`.
    pub name: String,
    /// Ordered fields.
    pub fields: Vec<Field>,
    fixed_len: usize,
    has_variable: bool,
}

impl PayloadSchema {
    /// Total wire size of the fixed fields.
    pub fn fixed_prefix_len(&self) -> usize {
        self.fixed_len
    }

    /// Whether the final field is the variable-length `uint8array`.
    pub fn has_variable_tail(&self) -> bool {
        self.has_variable
    }

    /// Maximum data bytes the variable tail may carry for this message.
    ///
    /// The whole frame is capped at 260 bytes; what remains after the
    /// 4-byte header, the fixed prefix and the 1-byte length prefix is the
    /// per-message budget (also bounded by the 255 the length byte can
    /// express). Each message therefore has its own limit, e.g. a payload
    /// with a 3-byte fixed prefix allows 252 data bytes.
    pub fn variable_budget(&self) -> usize {
        (MAX_FRAME_SIZE - HEADER_SIZE - self.fixed_len - 1).min(u8::MAX as usize)
    }
}

/// Registry entry for one command: its request schema, its response schema
/// (absent for fire-and-forget commands such as `system_reset`), and the
/// names of events that may follow asynchronously. The follow-up list is
/// documentation only and never enforced at runtime.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub request: PayloadSchema,
    pub response: Option<PayloadSchema>,
    pub follow_ups: Vec<String>,
}

/// Static, read-only table of every known message shape.
#[derive(Debug)]
pub struct MessageRegistry {
    class_names: HashMap<u8, String>,
    commands: HashMap<(u8, u8), CommandEntry>,
    events: HashMap<(u8, u8), PayloadSchema>,
    command_names: HashMap<String, (u8, u8)>,
}

static BLUETOOTH: OnceLock<Arc<MessageRegistry>> = OnceLock::new();

impl MessageRegistry {
    /// The embedded Bluetooth dictionary.
    pub fn bluetooth() -> &'static MessageRegistry {
        Self::bluetooth_shared()
    }

    /// The embedded Bluetooth dictionary as a shared handle, for components
    /// that hold the registry alongside a custom one.
    pub fn bluetooth_shared() -> &'static Arc<MessageRegistry> {
        BLUETOOTH.get_or_init(|| {
            Arc::new(
                MessageRegistry::from_json(include_str!("dictionary.json"))
                    .expect("embedded dictionary is valid"),
            )
        })
    }

    /// Build a registry from a JSON dictionary.
    ///
    /// # Errors
    ///
    /// [`BgError::Dictionary`] for malformed JSON, and
    /// [`BgError::InvalidDictionary`] for structural violations: duplicate
    /// IDs, an unknown field type, a variable-length field that is not the
    /// final field, or a fixed prefix that cannot fit the payload cap.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawDictionary = serde_json::from_str(json)?;

        let mut registry = MessageRegistry {
            class_names: HashMap::new(),
            commands: HashMap::new(),
            events: HashMap::new(),
            command_names: HashMap::new(),
        };

        for class in raw.classes {
            if registry
                .class_names
                .insert(class.id, class.name.clone())
                .is_some()
            {
                return Err(BgError::InvalidDictionary(format!(
                    "duplicate class id 0x{:02x}",
                    class.id
                )));
            }

            for command in class.commands {
                let full_name = format!("{}_{}", class.name, command.name);
                let request = build_schema(&full_name, &command.params)?;
                let response = if command.no_response {
                    None
                } else {
                    Some(build_schema(&full_name, &command.returns)?)
                };

                let key = (class.id, command.id);
                if registry.commands.contains_key(&key) {
                    return Err(BgError::InvalidDictionary(format!(
                        "duplicate command id 0x{:02x} in class {}",
                        command.id, class.name
                    )));
                }
                registry.commands.insert(
                    key,
                    CommandEntry {
                        request,
                        response,
                        follow_ups: command.follow_ups,
                    },
                );
                registry.command_names.insert(full_name, key);
            }

            for event in class.events {
                let full_name = format!("{}_{}", class.name, event.name);
                let schema = build_schema(&full_name, &event.params)?;

                let key = (class.id, event.id);
                if registry.events.insert(key, schema).is_some() {
                    return Err(BgError::InvalidDictionary(format!(
                        "duplicate event id 0x{:02x} in class {}",
                        event.id, class.name
                    )));
                }
            }
        }

        Ok(registry)
    }

    /// Look up the payload schema for an identity triple.
    ///
    /// A `Response` lookup resolves against the command entry with the same
    /// class and message IDs; it is `None` for fire-and-forget commands.
    pub fn schema(&self, id: MessageId) -> Option<&PayloadSchema> {
        let key = (id.class, id.id);
        match id.kind {
            MessageKind::Command => self.commands.get(&key).map(|e| &e.request),
            MessageKind::Response => self.commands.get(&key).and_then(|e| e.response.as_ref()),
            MessageKind::Event => self.events.get(&key),
        }
    }

    /// Look up a command entry by class and message ID.
    pub fn command(&self, class: u8, id: u8) -> Option<&CommandEntry> {
        self.commands.get(&(class, id))
    }

    /// Look up a command entry by full name, e.g. `system_hello`.
    pub fn command_by_name(&self, name: &str) -> Option<(MessageId, &CommandEntry)> {
        let &(class, id) = self.command_names.get(name)?;
        let entry = self.commands.get(&(class, id))?;
        Some((MessageId::command(class, id), entry))
    }

    /// Display name for an identity triple.
    pub fn name(&self, id: MessageId) -> Option<&str> {
        self.schema(id).map(|s| s.name.as_str())
    }

    /// Display name for a class.
    pub fn class_name(&self, class: u8) -> Option<&str> {
        self.class_names.get(&class).map(|s| s.as_str())
    }

    /// Iterate all commands as `(identity, entry)` pairs.
    pub fn commands(&self) -> impl Iterator<Item = (MessageId, &CommandEntry)> {
        self.commands
            .iter()
            .map(|(&(class, id), entry)| (MessageId::command(class, id), entry))
    }

    /// Iterate all events as `(identity, schema)` pairs.
    pub fn events(&self) -> impl Iterator<Item = (MessageId, &PayloadSchema)> {
        self.events
            .iter()
            .map(|(&(class, id), schema)| (MessageId::event(class, id), schema))
    }

    /// Number of registered commands.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Number of registered events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

fn build_schema(name: &str, raw_fields: &[RawField]) -> Result<PayloadSchema> {
    let mut fields = Vec::with_capacity(raw_fields.len());
    let mut fixed_len = 0usize;
    let mut has_variable = false;

    for raw in raw_fields {
        if has_variable {
            return Err(BgError::InvalidDictionary(format!(
                "{}: variable-length field must be the last field",
                name
            )));
        }

        let ty = parse_field_type(name, raw)?;
        match ty.fixed_size() {
            Some(size) => fixed_len += size,
            None => has_variable = true,
        }
        fields.push(Field {
            name: raw.name.clone(),
            ty,
        });
    }

    let min_len = fixed_len + usize::from(has_variable);
    if min_len > MAX_PAYLOAD_SIZE {
        return Err(BgError::InvalidDictionary(format!(
            "{}: fixed fields occupy {} bytes, over the {}-byte payload cap",
            name, min_len, MAX_PAYLOAD_SIZE
        )));
    }

    Ok(PayloadSchema {
        name: name.to_string(),
        fields,
        fixed_len,
        has_variable,
    })
}

fn parse_field_type(schema_name: &str, raw: &RawField) -> Result<FieldType> {
    match raw.ty.as_str() {
        "u8" => Ok(FieldType::U8),
        "u16" => Ok(FieldType::U16),
        "u32" => Ok(FieldType::U32),
        "i8" => Ok(FieldType::I8),
        "i16" => Ok(FieldType::I16),
        "i32" => Ok(FieldType::I32),
        "bytes" => {
            let size = raw.size.ok_or_else(|| {
                BgError::InvalidDictionary(format!(
                    "{}: field {} of type bytes needs a size",
                    schema_name, raw.name
                ))
            })?;
            Ok(FieldType::ByteArray(size))
        }
        "u8array" => Ok(FieldType::U8Array),
        other => Err(BgError::InvalidDictionary(format!(
            "{}: field {} has unknown type {}",
            schema_name, raw.name, other
        ))),
    }
}

#[derive(Deserialize)]
struct RawDictionary {
    classes: Vec<RawClass>,
}

#[derive(Deserialize)]
struct RawClass {
    name: String,
    id: u8,
    #[serde(default)]
    commands: Vec<RawCommand>,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
struct RawCommand {
    name: String,
    id: u8,
    #[serde(default)]
    params: Vec<RawField>,
    #[serde(default)]
    returns: Vec<RawField>,
    #[serde(default)]
    no_response: bool,
    #[serde(default)]
    follow_ups: Vec<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    name: String,
    id: u8,
    #[serde(default)]
    params: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    size: Option<usize>,
}
