//! Error types for bglink.

use thiserror::Error;

use crate::codec::MessageKind;

/// Main error type for all bglink operations.
///
/// Errors split into two families (see [`BgError::is_session_fatal`]):
/// local errors that reject a command before anything is written, and
/// session-fatal errors that indicate the frame boundary on the transport
/// can no longer be trusted.
#[derive(Debug, Error)]
pub enum BgError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed message dictionary (JSON level).
    #[error("dictionary error: {0}")]
    Dictionary(#[from] serde_json::Error),

    /// Structurally invalid message dictionary (e.g. a variable-length
    /// field that is not the last field of its payload).
    #[error("invalid dictionary: {0}")]
    InvalidDictionary(String),

    /// No registry entry for the given identity triple.
    #[error("unknown message: class 0x{class:02x}, id 0x{id:02x}, {kind}")]
    UnknownMessage { class: u8, id: u8, kind: MessageKind },

    /// Supplied field values do not match the schema's field count.
    #[error("{name}: expected {expected} field(s), got {actual}")]
    FieldCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A supplied field value has the wrong type for its schema slot.
    #[error("{name}: field {index} ({field}) does not match its declared type")]
    FieldTypeMismatch {
        name: String,
        index: usize,
        field: String,
    },

    /// The variable-length tail would push the frame past the message's
    /// declared maximum.
    #[error("{name}: variable payload of {actual} bytes exceeds budget of {max}")]
    PayloadTooLong {
        name: String,
        max: usize,
        actual: usize,
    },

    /// Fewer payload bytes than the schema requires.
    #[error("truncated payload: needed {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Command issued for a class that `init_class` has not been called on.
    #[error("class 0x{0:02x} has not been initialized")]
    ClassNotInitialized(u8),

    /// A command is already occupying the single in-flight slot.
    #[error("a command is already in flight")]
    CommandInFlight,

    /// A response frame arrived that does not correlate with the in-flight
    /// command (or arrived while no command was in flight).
    #[error("unexpected response: class 0x{class:02x}, id 0x{id:02x}")]
    UnexpectedResponse { class: u8, id: u8 },

    /// Caller-side API misuse: wrong accessor type on a decoded message,
    /// a command sent through the wrong entry point, a name with no
    /// dictionary entry. Never touches the transport.
    #[error("usage error: {0}")]
    Usage(String),

    /// Wire-level protocol violation not covered by a more specific
    /// variant (trailing payload bytes, a header over the payload cap).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The link has been torn down; no further frames will be exchanged.
    #[error("session closed")]
    SessionClosed,
}

/// Result type alias using BgError.
pub type Result<T> = std::result::Result<T, BgError>;

impl BgError {
    /// Whether this error indicates loss of frame synchronization or a
    /// registry mismatch between peers.
    ///
    /// A session that hits a fatal error should be torn down and
    /// re-established (e.g. via a `system_hello` exchange); there is no
    /// in-protocol resynchronization primitive beyond frame-length
    /// skipping.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            BgError::Io(_)
                | BgError::Truncated { .. }
                | BgError::UnexpectedResponse { .. }
                | BgError::Protocol(_)
                | BgError::SessionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_errors_are_not_fatal() {
        assert!(!BgError::CommandInFlight.is_session_fatal());
        assert!(!BgError::ClassNotInitialized(0x01).is_session_fatal());
        assert!(!BgError::UnknownMessage {
            class: 0x01,
            id: 0x00,
            kind: MessageKind::Command,
        }
        .is_session_fatal());
        assert!(!BgError::PayloadTooLong {
            name: "gatt_write_characteristic_value".into(),
            max: 252,
            actual: 300,
        }
        .is_session_fatal());
        assert!(!BgError::Usage("field 0 is not a u8".into()).is_session_fatal());
    }

    #[test]
    fn test_framing_errors_are_fatal() {
        assert!(BgError::Truncated {
            expected: 6,
            actual: 2
        }
        .is_session_fatal());
        assert!(BgError::UnexpectedResponse {
            class: 0x01,
            id: 0x03
        }
        .is_session_fatal());
        assert!(BgError::SessionClosed.is_session_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = BgError::ClassNotInitialized(0x09);
        assert_eq!(err.to_string(), "class 0x09 has not been initialized");

        let err = BgError::UnknownMessage {
            class: 0x42,
            id: 0x07,
            kind: MessageKind::Event,
        };
        assert!(err.to_string().contains("0x42"));
        assert!(err.to_string().contains("event"));
    }
}
