use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: channel (8) + length (4) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Largest payload the 32-bit length field can describe.
pub const MAX_PAYLOAD_LIMIT: usize = u32::MAX as usize;

/// A framed message on one logical channel.
///
/// Immutable once constructed; `payload` is a cheap reference-counted view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Opaque channel tag multiplexed within one pipe.
    pub channel: u64,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// A decoded frame together with the exact bytes it occupied on the wire.
#[derive(Debug, Clone)]
pub struct WireFrame {
    frame: Frame,
    wire: Bytes,
}

impl WireFrame {
    /// The parsed frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Header and payload bytes exactly as read.
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    /// Split into the parsed frame and the raw wire bytes.
    pub fn into_parts(self) -> (Frame, Bytes) {
        (self.frame, self.wire)
    }
}

/// Parsed fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub channel: u64,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Header plus payload size in bytes.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }
}

/// Parse a header from the front of `src`, or `None` if fewer than
/// [`HEADER_SIZE`] bytes are available.
pub fn parse_header(src: &[u8]) -> Option<FrameHeader> {
    if src.len() < HEADER_SIZE {
        return None;
    }

    let mut header = &src[..HEADER_SIZE];
    Some(FrameHeader {
        channel: header.get_u64_le(),
        payload_len: header.get_u32_le(),
    })
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬─────────────┬──────────────────┐
/// │ Channel (8B LE)  │ Length      │ Payload          │
/// │                  │ (4B LE)     │ (Length bytes)   │
/// └──────────────────┴─────────────┴──────────────────┘
/// ```
pub fn encode_frame(channel: u64, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_LIMIT {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LIMIT,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u64_le(channel);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer and returns them
/// alongside the parsed frame.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<WireFrame>> {
    let Some(header) = parse_header(src) else {
        return Ok(None); // Need more data
    };

    let payload_len = header.payload_len as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = header.frame_len();
    if src.len() < total {
        return Ok(None); // Need more data
    }

    let wire = src.split_to(total).freeze();
    let payload = wire.slice(HEADER_SIZE..);

    Ok(Some(WireFrame {
        frame: Frame {
            channel: header.channel,
            payload,
        },
        wire,
    }))
}

/// Configuration for the frame reader.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: the full 32-bit range.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_LIMIT,
        }
    }
}
