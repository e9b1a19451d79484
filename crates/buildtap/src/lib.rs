//! Transparent logging proxy for the Xcode build service.
//!
//! buildtap sits between the build orchestrator and the build service it
//! launches, relays all three stdio streams byte for byte, and logs every
//! framed MessagePack message it recognizes along the way.
//!
//! # Crate Structure
//!
//! - [`frame`]: 12-byte header framing (channel + length)
//! - [`payload`]: MessagePack payload decoding for logging
//! - [`relay`]: Stream relays, record sink, and service launcher

/// Re-export frame types.
pub mod frame {
    pub use buildtap_frame::*;
}

/// Re-export payload types.
pub mod payload {
    pub use buildtap_payload::*;
}

/// Re-export relay types.
pub mod relay {
    pub use buildtap_relay::*;
}
