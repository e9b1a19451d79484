//! Self-describing payload decoding for build service frames.
//!
//! Payloads are MessagePack: every value carries its own type tag and length,
//! so no schema is needed. Decoding here is diagnostic only. A payload that
//! fails to decode becomes an [`MessageBody::Undecodable`] carrying the raw
//! bytes, never an error that could stop the caller.

pub mod decode;
pub mod error;
pub mod value;

pub use decode::{decode_message, decode_values, DecodedMessage, MessageBody, MAX_NESTING_DEPTH};
pub use error::{DecodeError, Result};
pub use value::Value;
