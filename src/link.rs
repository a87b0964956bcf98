//! Link - the host's connection to a device over a byte stream.
//!
//! A [`Link`] is created by attaching a [`LinkBuilder`] to any transport
//! implementing `AsyncRead + AsyncWrite` (a serial port, a TCP socket, an
//! in-memory duplex in tests). Attaching splits the transport and spawns a
//! reader task that owns the read half for the life of the session:
//!
//! ```text
//!                    ┌────────────────┐
//!  call() ──encode──▶│   write half   │──bytes──▶ device
//!    ▲               └────────────────┘
//!    │ oneshot                          ┌──────────────┐
//!    └───────────── CommandEngine ◀─────│ reader task  │◀── bytes
//!                        │              └──────────────┘
//!                        ▼
//!                   EventQueue ──▶ wait_event()
//! ```
//!
//! The session is fail-fast: the first unrecoverable error (I/O failure,
//! truncated or trailing payload, uncorrelatable response) closes the link,
//! fails the in-flight command, and drains waiters with `SessionClosed`.
//! Recoverable conditions (unknown events, foreign technology frames) are
//! logged and skipped without disturbing the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::codec::{FieldValue, Message, MessageId};
use crate::engine::{CommandEngine, InFlightInfo};
use crate::error::{BgError, Result};
use crate::events::EventQueue;
use crate::gate::ClassGate;
use crate::protocol::{FrameBuffer, HEADER_SIZE};
use crate::registry::MessageRegistry;

const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Builder for [`Link`].
///
/// # Example
///
/// ```no_run
/// use bglink::LinkBuilder;
///
/// # async fn connect() -> bglink::Result<()> {
/// let stream = tokio::net::TcpStream::connect("192.168.1.10:5554").await?;
/// let link = LinkBuilder::new().attach(stream);
/// link.init_class(bglink::registry::classes::SYSTEM);
/// let result = link.system_hello().await?;
/// assert!(result.is_ok());
/// # Ok(())
/// # }
/// ```
pub struct LinkBuilder {
    registry: Arc<MessageRegistry>,
    technology: u8,
    read_buffer_size: usize,
}

impl LinkBuilder {
    /// Builder with the embedded Bluetooth dictionary and defaults.
    pub fn new() -> Self {
        Self {
            registry: Arc::clone(MessageRegistry::bluetooth_shared()),
            technology: 0,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Use a custom message registry instead of the embedded one.
    pub fn registry(mut self, registry: Arc<MessageRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Technology type stamped on outgoing headers and required on incoming
    /// ones. Frames for other technology types are skipped.
    pub fn technology(mut self, technology: u8) -> Self {
        self.technology = technology;
        self
    }

    /// Size of the reader task's read buffer. Clamped to at least one
    /// header, since a zero-byte read is indistinguishable from peer
    /// hang-up.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(HEADER_SIZE);
        self
    }

    /// Split the transport, spawn the reader task, and return the link.
    pub fn attach<T>(self, transport: T) -> Link
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);

        let events = Arc::new(EventQueue::new());
        let engine = Arc::new(CommandEngine::new(
            self.registry,
            Arc::clone(&events),
            self.technology,
        ));
        let closed = Arc::new(AtomicBool::new(false));
        let closed_notify = Arc::new(Notify::new());

        let reader = tokio::spawn(read_loop(
            Box::new(read_half) as Box<dyn AsyncRead + Send + Unpin>,
            Arc::clone(&engine),
            Arc::clone(&events),
            Arc::clone(&closed),
            Arc::clone(&closed_notify),
            self.read_buffer_size,
        ));

        Link {
            engine,
            events,
            writer: tokio::sync::Mutex::new(Box::new(write_half)),
            closed,
            closed_notify,
            reader,
        }
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An attached session with a device.
pub struct Link {
    engine: Arc<CommandEngine>,
    events: Arc<EventQueue>,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    closed: Arc<AtomicBool>,
    closed_notify: Arc<Notify>,
    reader: JoinHandle<()>,
}

impl Link {
    /// Send a command and wait for its response.
    ///
    /// Commands are strictly half-duplex: a second call while one is
    /// outstanding fails immediately with [`BgError::CommandInFlight`].
    /// Validation failures (unknown message, bad fields, oversize payload,
    /// uninitialized class) are reported before any byte is written, so a
    /// rejected command never desynchronizes the session. Callers wanting a
    /// deadline wrap this in `tokio::time::timeout` and call
    /// [`Link::abandon_in_flight`] on expiry.
    pub async fn call(&self, msg: Message) -> Result<Message> {
        let entry = self
            .engine
            .registry()
            .command(msg.id.class, msg.id.id)
            .ok_or(BgError::UnknownMessage {
                class: msg.id.class,
                id: msg.id.id,
                kind: msg.id.kind,
            })?;
        if entry.response.is_none() {
            return Err(BgError::Usage(format!(
                "{} has no response; use send_no_response",
                entry.request.name
            )));
        }

        let bytes = self.prepare(&msg)?;
        let rx = self.engine.begin(msg.id)?;

        if let Err(err) = self.write(&bytes).await {
            self.engine.abandon(msg.id);
            return Err(err);
        }

        // A dropped sender means the session died under us.
        rx.await.map_err(|_| BgError::SessionClosed)
    }

    /// Send a fire-and-forget command (one whose dictionary entry declares
    /// no response, such as a reset). Does not occupy the command slot.
    pub async fn send_no_response(&self, msg: Message) -> Result<()> {
        let entry = self
            .engine
            .registry()
            .command(msg.id.class, msg.id.id)
            .ok_or(BgError::UnknownMessage {
                class: msg.id.class,
                id: msg.id.id,
                kind: msg.id.kind,
            })?;
        if entry.response.is_some() {
            return Err(BgError::Usage(format!(
                "{} expects a response; use call",
                entry.request.name
            )));
        }

        let bytes = self.prepare(&msg)?;
        self.write(&bytes).await
    }

    /// Send a command looked up by its dictionary name, e.g.
    /// `"system_hello"`. Dispatches to [`Link::call`].
    pub async fn call_named(&self, name: &str, fields: Vec<FieldValue>) -> Result<Message> {
        let (id, _) = self
            .engine
            .registry()
            .command_by_name(name)
            .ok_or_else(|| BgError::Usage(format!("no command named {}", name)))?;
        self.call(Message {
            id,
            fields,
        })
        .await
    }

    /// Wait for the next event in arrival order.
    pub async fn wait_event(&self) -> Result<Message> {
        self.events.wait_event().await
    }

    /// Dequeue the next event without blocking; `None` when the queue is
    /// empty.
    pub fn peek_event(&self) -> Option<Message> {
        self.events.peek_event()
    }

    /// Whether any events are queued. `false` means the application may let
    /// the transport sleep.
    pub fn has_pending_events(&self) -> bool {
        self.events.has_pending()
    }

    /// Number of queued events.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Mark a protocol class as initialized, unlocking its commands.
    pub fn init_class(&self, class_id: u8) {
        self.engine.gate().init_class(class_id);
    }

    /// Check whether a class has been initialized.
    pub fn is_class_initialized(&self, class_id: u8) -> bool {
        self.engine.gate().is_initialized(class_id)
    }

    /// Access the class gate directly.
    pub fn gate(&self) -> &ClassGate {
        self.engine.gate()
    }

    /// Whether no command is outstanding.
    pub fn is_idle(&self) -> bool {
        self.engine.is_idle()
    }

    /// Identity and age of the outstanding command, if any.
    pub fn in_flight(&self) -> Option<InFlightInfo> {
        self.engine.in_flight()
    }

    /// Give up on an outstanding command after a caller-imposed deadline.
    /// The slot is only cleared if it still holds `id`.
    pub fn abandon_in_flight(&self, id: MessageId) {
        self.engine.abandon(id);
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait until the session closes.
    pub async fn closed(&self) {
        while !self.is_closed() {
            let notified = self.closed_notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// The registry this link encodes and decodes against.
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        self.engine.registry()
    }

    fn prepare(&self, msg: &Message) -> Result<Vec<u8>> {
        if self.is_closed() {
            return Err(BgError::SessionClosed);
        }
        self.engine.encode_command(msg)
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut read_half: Box<dyn AsyncRead + Send + Unpin>,
    engine: Arc<CommandEngine>,
    events: Arc<EventQueue>,
    closed: Arc<AtomicBool>,
    closed_notify: Arc<Notify>,
    buffer_size: usize,
) {
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; buffer_size];

    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("transport closed by peer");
                break;
            }
            Ok(n) => match frames.push(&buf[..n]) {
                Ok(complete) => {
                    let mut fatal = false;
                    for frame in complete {
                        if let Err(err) = engine.on_frame(&frame) {
                            tracing::error!(error = %err, "closing session");
                            fatal = true;
                            break;
                        }
                    }
                    if fatal {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "framing failure, closing session");
                    break;
                }
            },
            Err(err) => {
                tracing::error!(error = %err, "transport read failed");
                break;
            }
        }
    }

    closed.store(true, Ordering::Release);
    events.close();
    engine.fail_in_flight();
    closed_notify.notify_waiters();
}
