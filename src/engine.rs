//! Command engine - half-duplex RPC discipline and inbound dispatch.
//!
//! The protocol allows exactly one outstanding command at a time. The
//! engine owns that rule: a single in-flight slot pairs each sent command
//! with the `oneshot` channel its caller is parked on, and every inbound
//! frame is routed here to be classified as the pending response or an
//! unsolicited event. Responses never touch the event queue and events
//! never touch the slot.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::oneshot;

use crate::codec::{decode_frame_as, encode_message, Message, MessageId, MessageKind};
use crate::error::{BgError, Result};
use crate::events::EventQueue;
use crate::gate::ClassGate;
use crate::protocol::Frame;
use crate::registry::MessageRegistry;

/// Snapshot of the currently outstanding command, for callers that enforce
/// their own deadlines.
#[derive(Debug, Clone, Copy)]
pub struct InFlightInfo {
    /// Identity of the outstanding command.
    pub id: MessageId,
    /// When the command was handed to the transport.
    pub issued_at: Instant,
}

struct InFlight {
    id: MessageId,
    issued_at: Instant,
    tx: oneshot::Sender<Message>,
}

/// Protocol state machine shared between callers and the reader task.
pub struct CommandEngine {
    registry: Arc<MessageRegistry>,
    gate: ClassGate,
    events: Arc<EventQueue>,
    slot: Mutex<Option<InFlight>>,
    technology: u8,
}

impl CommandEngine {
    pub fn new(registry: Arc<MessageRegistry>, events: Arc<EventQueue>, technology: u8) -> Self {
        Self {
            registry,
            gate: ClassGate::new(),
            events,
            slot: Mutex::new(None),
            technology,
        }
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &ClassGate {
        &self.gate
    }

    /// Encode a command frame, enforcing the class gate.
    ///
    /// All validation happens here, before any byte reaches the transport:
    /// a rejected command leaves the session untouched.
    pub fn encode_command(&self, msg: &Message) -> Result<Vec<u8>> {
        if msg.id.kind != MessageKind::Command {
            return Err(BgError::Usage(format!(
                "cannot send a {} as a command",
                msg.id.kind
            )));
        }
        self.gate.require_initialized(msg.id.class)?;
        encode_message(&self.registry, msg, self.technology)
    }

    /// Claim the in-flight slot for a command.
    ///
    /// Returns the receiver the caller awaits the response on, or
    /// `CommandInFlight` if another command already holds the slot.
    pub fn begin(&self, id: MessageId) -> Result<oneshot::Receiver<Message>> {
        let mut slot = self.slot.lock().expect("command slot mutex poisoned");
        if slot.is_some() {
            return Err(BgError::CommandInFlight);
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(InFlight {
            id,
            issued_at: Instant::now(),
            tx,
        });
        Ok(rx)
    }

    /// Release the slot without a response, e.g. after a failed write or a
    /// caller-imposed deadline. Only clears the slot if it still holds the
    /// given command.
    pub fn abandon(&self, id: MessageId) {
        let mut slot = self.slot.lock().expect("command slot mutex poisoned");
        if slot.as_ref().is_some_and(|f| f.id == id) {
            *slot = None;
        }
    }

    /// Whether no command is outstanding.
    pub fn is_idle(&self) -> bool {
        self.slot
            .lock()
            .expect("command slot mutex poisoned")
            .is_none()
    }

    /// Identity and age of the outstanding command, if any.
    pub fn in_flight(&self) -> Option<InFlightInfo> {
        self.slot
            .lock()
            .expect("command slot mutex poisoned")
            .as_ref()
            .map(|f| InFlightInfo {
                id: f.id,
                issued_at: f.issued_at,
            })
    }

    /// Drop the outstanding command on session teardown, waking its caller
    /// with a channel error.
    pub fn fail_in_flight(&self) {
        self.slot
            .lock()
            .expect("command slot mutex poisoned")
            .take();
    }

    /// Dispatch one inbound frame.
    ///
    /// Frames for another technology type and unknown events are logged and
    /// skipped; the framing layer has already consumed their declared
    /// length, so the stream stays aligned. Everything else that goes wrong
    /// here is a correlation or decode failure and is returned to the
    /// reader task to tear the session down.
    pub fn on_frame(&self, frame: &Frame) -> Result<()> {
        if frame.header.technology != self.technology {
            tracing::warn!(
                technology = frame.header.technology,
                class = frame.class_id(),
                message = frame.message_id(),
                "skipping frame for foreign technology type"
            );
            return Ok(());
        }

        if frame.is_event() {
            return self.on_event(frame);
        }
        self.on_response(frame)
    }

    fn on_event(&self, frame: &Frame) -> Result<()> {
        match decode_frame_as(&self.registry, frame, MessageKind::Event) {
            Ok(event) => {
                tracing::debug!(
                    name = self.registry.name(event.id).unwrap_or("?"),
                    queued = self.events.len(),
                    "event received"
                );
                self.events.push(event);
                Ok(())
            }
            // Version skew: the device knows events this host does not.
            // The payload was consumed by length, so skipping is safe.
            Err(BgError::UnknownMessage { class, id, .. }) => {
                tracing::warn!(
                    class,
                    message = id,
                    "skipping unknown event"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn on_response(&self, frame: &Frame) -> Result<()> {
        let in_flight = {
            let mut slot = self.slot.lock().expect("command slot mutex poisoned");
            match slot.take() {
                Some(f) if f.id.class == frame.class_id() && f.id.id == frame.message_id() => f,
                other => {
                    *slot = other;
                    return Err(BgError::UnexpectedResponse {
                        class: frame.class_id(),
                        id: frame.message_id(),
                    });
                }
            }
        };

        // A decode failure drops the sender, waking the caller with a
        // closed-channel error while the session tears down.
        let response = decode_frame_as(&self.registry, frame, MessageKind::Response)?;
        tracing::debug!(
            name = self.registry.name(response.id).unwrap_or("?"),
            elapsed_us = in_flight.issued_at.elapsed().as_micros() as u64,
            "response correlated"
        );
        // The caller may have given up; a dead receiver is not an error.
        let _ = in_flight.tx.send(response);
        Ok(())
    }
}
