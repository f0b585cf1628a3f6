//! Frame codec for the device link
//!
//! One frame on the wire:
//! ```text
//! [ u32 big-endian body length ][ body: JSON-encoded Frame ]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::Frame;

/// Largest body either side will produce or accept (1 MiB)
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("frame body of {0} bytes exceeds {MAX_MESSAGE_SIZE}")]
    Oversized(usize),

    #[error("length prefix {0} exceeds {MAX_MESSAGE_SIZE}")]
    BadLength(u32),

    #[error("malformed frame body: {0}")]
    Body(#[from] serde_json::Error),
}

impl CodecError {
    /// A malformed body has already been consumed, so reading can go on.
    /// A bad prefix means the stream position can no longer be trusted.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::Body(_))
    }
}

/// Serialize `frame` with its length prefix
pub fn encode(frame: &Frame) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(frame)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or(CodecError::Oversized(body.len()))?;

    let mut out = BytesMut::with_capacity(PREFIX_LEN + body.len());
    out.put_u32(len);
    out.extend_from_slice(&body);
    Ok(out.freeze())
}

/// Body length announced at the front of `buf`, if the prefix has arrived
fn announced_len(buf: &[u8]) -> Result<Option<usize>, CodecError> {
    let Some(prefix) = buf.get(..PREFIX_LEN) else {
        return Ok(None);
    };
    let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if len > MAX_MESSAGE_SIZE {
        return Err(CodecError::BadLength(len));
    }
    Ok(Some(len as usize))
}

/// Accumulates bytes from a stream and yields whole frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            pending: BytesMut::with_capacity(4096),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Next complete frame, or `Ok(None)` until more bytes arrive.
    ///
    /// Call repeatedly after each `extend` to drain everything buffered.
    pub fn decode_next(&mut self) -> Result<Option<Frame>, CodecError> {
        let Some(len) = announced_len(&self.pending)? else {
            return Ok(None);
        };
        if self.pending.len() < PREFIX_LEN + len {
            return Ok(None);
        }

        self.pending.advance(PREFIX_LEN);
        let body = self.pending.split_to(len);
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
