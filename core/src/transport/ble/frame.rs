/// Frame codec for GATT characteristic writes
///
/// Every write carries one frame: `[flag: u8 | stream_id: u8 (optional) | payload...]`.
/// The flag is `0` for the last frame of a message and `1` for every frame
/// before it. The stream id byte is only present when multiplexing is enabled.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the flag byte
pub const FLAG_SIZE: usize = 1;

/// Size of the optional stream id byte
pub const STREAM_ID_SIZE: usize = 1;

/// Header length for the given framing mode
pub fn header_size(multiplexed: bool) -> usize {
    if multiplexed {
        FLAG_SIZE + STREAM_ID_SIZE
    } else {
        FLAG_SIZE
    }
}

/// Fragmentation flag. The numeric values are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameFlag {
    /// Last frame of a message
    End = 0,
    /// More frames follow
    Continue = 1,
}

impl FrameFlag {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameFlag {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameFlag::End),
            1 => Ok(FrameFlag::Continue),
            other => Err(CodecError::UnknownFlag(other)),
        }
    }
}

/// Errors for frame decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty frame (no flag byte)")]
    Empty,
    #[error("Unknown frame flag: {0:#04x}")]
    UnknownFlag(u8),
    #[error("Frame is missing its stream id byte")]
    MissingStreamId,
}

/// One wire-level chunk of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flag: FrameFlag,
    pub stream_id: Option<u8>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(flag: FrameFlag, stream_id: Option<u8>, payload: Vec<u8>) -> Self {
        Self {
            flag,
            stream_id,
            payload,
        }
    }

    pub fn is_end(&self) -> bool {
        self.flag == FrameFlag::End
    }

    /// Bytes this frame occupies on the wire
    pub fn wire_len(&self) -> usize {
        header_size(self.stream_id.is_some()) + self.payload.len()
    }

    /// Serialize to the wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_len());
        bytes.push(self.flag.as_byte());
        if let Some(stream_id) = self.stream_id {
            bytes.push(stream_id);
        }
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Split `payload` into frames carrying at most `capacity` bytes each.
///
/// Always yields at least one frame: an empty payload becomes a single empty
/// `End` frame so receivers can observe empty messages. A capacity of zero is
/// treated as one.
pub fn encode(payload: &[u8], capacity: usize, stream_id: Option<u8>) -> Vec<Frame> {
    let capacity = capacity.max(1);

    if payload.is_empty() {
        return vec![Frame::new(FrameFlag::End, stream_id, Vec::new())];
    }

    let total = payload.len().div_ceil(capacity);
    payload
        .chunks(capacity)
        .enumerate()
        .map(|(index, chunk)| {
            let flag = if index + 1 == total {
                FrameFlag::End
            } else {
                FrameFlag::Continue
            };
            Frame::new(flag, stream_id, chunk.to_vec())
        })
        .collect()
}

/// Parse one raw characteristic value
pub fn decode(raw: &[u8], multiplexed: bool) -> Result<Frame, CodecError> {
    let (&flag_byte, rest) = raw.split_first().ok_or(CodecError::Empty)?;
    let flag = FrameFlag::try_from(flag_byte)?;

    if multiplexed {
        let (&stream_id, payload) = rest.split_first().ok_or(CodecError::MissingStreamId)?;
        Ok(Frame::new(flag, Some(stream_id), payload.to_vec()))
    } else {
        Ok(Frame::new(flag, None, rest.to_vec()))
    }
}
