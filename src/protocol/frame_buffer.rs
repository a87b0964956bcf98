//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management and a small state
//! machine for handling fragmented frames:
//! - `WaitingForHeader`: need at least 4 bytes
//! - `WaitingForPayload`: header parsed, need `payload_length` more bytes
//!
//! Because a frame is only emitted once all of its declared payload bytes
//! have been consumed, an inbound frame that later fails registry lookup has
//! already been skipped in full; the next extraction starts at the next
//! frame boundary. That is the protocol's only (best-effort) recovery from
//! a registry mismatch between peers.

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete 4-byte header.
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with the registry payload cap (256 bytes).
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with a custom payload cap.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// This is the main API for processing incoming transport data. If data
    /// is fragmented, partial bytes are buffered internally for the next
    /// push.
    ///
    /// # Errors
    ///
    /// Returns an error if a header declares a payload over the cap. After
    /// that no frame boundary can be trusted; callers should tear the
    /// session down.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let header =
                    Header::decode(&self.buffer[..HEADER_SIZE]).expect("buffer has enough bytes");
                header.validate(self.max_payload_size)?;

                let _ = self.buffer.split_to(HEADER_SIZE);

                if header.payload_length == 0 {
                    return Ok(Some(Frame::new(header, Bytes::new())));
                }

                self.state = State::WaitingForPayload { header };
                self.try_extract_one()
            }

            State::WaitingForPayload { header } => {
                let needed = header.payload_length as usize;
                if self.buffer.len() < needed {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(needed).freeze();
                let header = *header;
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(header, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset the state machine.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
