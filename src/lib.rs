//! # bglink
//!
//! Host-side implementation of a binary command/response/event protocol for
//! driving a Bluetooth device over a byte stream (UART, TCP, or anything
//! else implementing `AsyncRead + AsyncWrite`).
//!
//! Every message starts with a 4-byte header carrying the message type, an
//! 11-bit payload length, a class ID and a message ID. Three kinds of
//! message flow over the link:
//!
//! - **Commands**: host to device, at most one outstanding at a time
//! - **Responses**: the device's reply to the outstanding command
//! - **Events**: unsolicited device-to-host messages, delivered in strict
//!   arrival order through an unbounded FIFO queue
//!
//! Payload shapes are not hand-written per message: a declarative data
//! dictionary (see [`registry`]) describes every command, response and
//! event, and one generic codec walks those schemas in both directions.
//!
//! ## Layers
//!
//! ```text
//! Link / commands      typed API, session lifecycle
//! CommandEngine        in-flight slot, response correlation, class gate
//! codec                schema-driven payload encode/decode
//! protocol             4-byte header, frame accumulation
//! transport            any AsyncRead + AsyncWrite
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use bglink::{registry::classes, LinkBuilder};
//!
//! # async fn run() -> bglink::Result<()> {
//! let stream = tokio::net::TcpStream::connect("10.0.0.5:5554").await?;
//! let link = LinkBuilder::new().attach(stream);
//!
//! link.init_class(classes::SYSTEM);
//! let result = link.system_hello().await?;
//! assert!(result.is_ok());
//!
//! let address = link.system_get_bt_address().await?;
//! println!("device address: {}", address);
//!
//! // Unsolicited events are queued independently of the RPC traffic.
//! let event = link.wait_event().await?;
//! println!("event: {:?}", event.id);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod commands;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod link;
pub mod protocol;
pub mod registry;

pub use codec::{BdAddr, FieldValue, Message, MessageId, MessageKind, ResultCode};
pub use engine::InFlightInfo;
pub use error::{BgError, Result};
pub use link::{Link, LinkBuilder};
pub use registry::MessageRegistry;
