use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::codec::{decode_frame, parse_header, FrameConfig, WireFrame};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Result of one [`FrameReader::read_frame`] call.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete frame and the exact bytes it occupied.
    Frame(WireFrame),
    /// The source reached end-of-stream. `partial` holds any bytes of an
    /// incomplete frame that were read but never emitted.
    Closed { partial: Bytes },
}

/// Where the reader is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    AwaitingHeader,
    AwaitingPayload { channel: u64, payload_len: u32 },
}

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally. Callers get complete frames, or the
/// leftover bytes once the stream ends.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Never waits past end-of-stream: a truncated frame is reported as
    /// [`ReadOutcome::Closed`] carrying the bytes already read. On
    /// `Err(FrameError::Io)` buffered bytes stay available through
    /// [`FrameReader::take_buffered`].
    pub fn read_frame(&mut self) -> Result<ReadOutcome> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(ReadOutcome::Frame(frame));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    tracing::debug!(
                        buffered = self.buf.len(),
                        state = ?self.state(),
                        "stream closed mid-frame"
                    );
                }
                return Ok(ReadOutcome::Closed {
                    partial: self.take_buffered(),
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Current position within the frame being assembled.
    pub fn state(&self) -> FramerState {
        match parse_header(&self.buf) {
            Some(header) => FramerState::AwaitingPayload {
                channel: header.channel,
                payload_len: header.payload_len,
            },
            None => FramerState::AwaitingHeader,
        }
    }

    /// Remove and return bytes read from the source but not yet emitted.
    pub fn take_buffered(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Buffered bytes are discarded; call [`FrameReader::take_buffered`] first.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
