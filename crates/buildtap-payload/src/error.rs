/// Errors that can occur while decoding a payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The bytes at `offset` do not form a valid value (bad tag, truncation,
    /// excessive nesting).
    #[error("malformed value at byte {offset}: {source}")]
    Malformed {
        offset: usize,
        #[source]
        source: rmp_serde::decode::Error,
    },

    /// The decoder made no progress at `offset`.
    #[error("decoder stalled at byte {offset}")]
    Stalled { offset: usize },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
