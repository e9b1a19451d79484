//! Length-prefixed framing for build service traffic.
//!
//! Every message on a framed stream is:
//! - An 8-byte little-endian channel ID
//! - A 4-byte little-endian payload length
//! - Exactly that many payload bytes
//!
//! The reader never interprets payload bytes and always hands back the exact
//! wire bytes it consumed, so callers can forward them unchanged.

pub mod codec;
pub mod error;
pub mod reader;

pub use codec::{
    decode_frame, encode_frame, parse_header, Frame, FrameConfig, FrameHeader, WireFrame,
    HEADER_SIZE, MAX_PAYLOAD_LIMIT,
};
pub use error::{FrameError, Result};
pub use reader::{FrameReader, FramerState, ReadOutcome};
