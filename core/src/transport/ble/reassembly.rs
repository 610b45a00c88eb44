/// Reassembly buffer for fragmented GATT messages
///
/// Frames are assumed to arrive in order (GATT writes on one connection are
/// ordered). An `End` frame that overtakes its `Continue` frames completes the
/// message early with whatever was accumulated; there is no sequence number
/// to detect it.

use super::frame::Frame;
use thiserror::Error;

/// Errors for reassembly
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("Reassembly overflow: {attempted} bytes exceeds limit of {limit}")]
    Overflow { limit: usize, attempted: usize },
}

/// Outcome of appending a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferState {
    /// More frames are expected
    InProgress,
    /// The terminal frame arrived; the buffer has been reset
    Complete(Vec<u8>),
}

/// Accumulator for one in-progress message of one (peer, stream)
#[derive(Debug, Clone)]
pub struct ReassemblyBuffer {
    data: Vec<u8>,
    max_message_size: usize,
    frames: usize,
}

impl ReassemblyBuffer {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            data: Vec::new(),
            max_message_size,
            frames: 0,
        }
    }

    /// Append a frame's payload.
    ///
    /// On overflow the stale bytes are discarded and the buffer restarts from
    /// the offending frame: a `Continue` frame seeds the next message, an `End`
    /// frame leaves the buffer empty.
    pub fn append(&mut self, frame: Frame) -> Result<BufferState, ReassemblyError> {
        let attempted = self.data.len() + frame.payload.len();
        if attempted > self.max_message_size {
            self.clear();
            if !frame.is_end() && frame.payload.len() <= self.max_message_size {
                self.data = frame.payload;
                self.frames = 1;
            }
            return Err(ReassemblyError::Overflow {
                limit: self.max_message_size,
                attempted,
            });
        }

        self.data.extend_from_slice(&frame.payload);
        self.frames += 1;

        if frame.is_end() {
            self.frames = 0;
            Ok(BufferState::Complete(std::mem::take(&mut self.data)))
        } else {
            Ok(BufferState::InProgress)
        }
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether a message has started but not ended
    pub fn is_in_progress(&self) -> bool {
        self.frames > 0
    }

    /// Drop any partial message
    pub fn clear(&mut self) {
        self.data.clear();
        self.frames = 0;
    }
}
