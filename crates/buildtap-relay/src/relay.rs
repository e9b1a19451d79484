use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;

use buildtap_frame::{FrameConfig, FrameError, FrameReader, ReadOutcome};

use crate::channel::RelayChannel;
use crate::sink::RecordSink;
use crate::tap::{FrameTap, TapBacklog};

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Why a relay stopped.
#[derive(Debug)]
pub enum RelayEnd {
    /// The source reached end-of-stream.
    SourceClosed,
    /// Reading the source failed.
    SourceFailed(io::Error),
    /// Forwarding to the sink failed.
    SinkFailed(io::Error),
}

/// Summary returned when a relay terminates.
#[derive(Debug)]
pub struct RelayReport {
    pub channel: RelayChannel,
    pub bytes_forwarded: u64,
    pub frames: u64,
    /// Framing was abandoned after an oversized header.
    pub desynced: bool,
    pub end: RelayEnd,
}

/// Pumps bytes from one endpoint to another.
///
/// An observed relay reads whole frames before forwarding them, but every
/// byte it reads is written to the sink unchanged whether or not it parses.
/// The sink is dropped (closed) when the relay ends.
pub struct DuplexRelay<R, W> {
    channel: RelayChannel,
    source: R,
    sink: W,
    frame_config: FrameConfig,
    records: Option<(Arc<RecordSink>, Arc<TapBacklog>)>,
}

#[derive(Default)]
struct Counters {
    bytes: u64,
    frames: u64,
    desynced: bool,
}

impl<R: Read, W: Write> DuplexRelay<R, W> {
    pub fn new(channel: RelayChannel, source: R, sink: W) -> Self {
        Self {
            channel,
            source,
            sink,
            frame_config: FrameConfig::default(),
            records: None,
        }
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Log frames from an observed channel to `sink`.
    pub fn with_record_sink(mut self, sink: Arc<RecordSink>) -> Self {
        self.records = Some((sink, Arc::new(TapBacklog::default())));
        self
    }

    /// Records offered to the sink but not yet written, if this relay logs.
    pub fn backlog(&self) -> Option<Arc<TapBacklog>> {
        self.records.as_ref().map(|(_, backlog)| Arc::clone(backlog))
    }

    /// Relay until the source ends or either side fails (blocking).
    pub fn run(self) -> RelayReport {
        let DuplexRelay {
            channel,
            mut source,
            mut sink,
            frame_config,
            records,
        } = self;

        let span = tracing::debug_span!("relay", stream = %channel.role, observed = channel.observed);
        let _enter = span.enter();

        let mut counters = Counters::default();
        let end = if channel.observed {
            let mut tap = records
                .map(|(records, backlog)| FrameTap::spawn(channel.role, records, backlog));
            let end = relay_frames(source, &mut sink, frame_config, tap.as_mut(), &mut counters);
            if let Some(tap) = tap {
                tap.finish();
            }
            end
        } else {
            copy_plain(&mut source, &mut sink, &mut counters)
        };

        match &end {
            RelayEnd::SourceClosed => tracing::debug!(bytes = counters.bytes, "source closed"),
            RelayEnd::SourceFailed(err) => tracing::debug!(error = %err, "source read failed"),
            RelayEnd::SinkFailed(err) => tracing::warn!(error = %err, "forwarding failed"),
        }
        drop(sink);

        RelayReport {
            channel,
            bytes_forwarded: counters.bytes,
            frames: counters.frames,
            desynced: counters.desynced,
            end,
        }
    }
}

fn relay_frames<R: Read, W: Write>(
    source: R,
    sink: &mut W,
    config: FrameConfig,
    mut tap: Option<&mut FrameTap>,
    counters: &mut Counters,
) -> RelayEnd {
    let mut reader = FrameReader::with_config(source, config);

    loop {
        match reader.read_frame() {
            Ok(ReadOutcome::Frame(wire_frame)) => {
                let (frame, wire) = wire_frame.into_parts();
                // Queued first so the record is pending before the peer can
                // act on the bytes.
                if let Some(tap) = tap.as_deref_mut() {
                    tap.offer(frame);
                }
                if let Err(err) = forward(sink, &wire, counters) {
                    return RelayEnd::SinkFailed(err);
                }
                counters.frames += 1;
            }
            Ok(ReadOutcome::Closed { partial }) => {
                return match forward(sink, &partial, counters) {
                    Ok(()) => RelayEnd::SourceClosed,
                    Err(err) => RelayEnd::SinkFailed(err),
                };
            }
            Err(FrameError::PayloadTooLarge { size, max }) => {
                tracing::warn!(size, max, "oversized frame header, relaying unframed");
                counters.desynced = true;
                if let Err(err) = forward(sink, &reader.take_buffered(), counters) {
                    return RelayEnd::SinkFailed(err);
                }
                let mut source = reader.into_inner();
                return copy_plain(&mut source, sink, counters);
            }
            Err(FrameError::Io(err)) => {
                return match forward(sink, &reader.take_buffered(), counters) {
                    Ok(()) => RelayEnd::SourceFailed(err),
                    Err(sink_err) => RelayEnd::SinkFailed(sink_err),
                };
            }
        }
    }
}

fn copy_plain<R: Read, W: Write>(source: &mut R, sink: &mut W, counters: &mut Counters) -> RelayEnd {
    let mut chunk = vec![0u8; COPY_CHUNK_SIZE];
    loop {
        let read = match source.read(&mut chunk) {
            Ok(0) => return RelayEnd::SourceClosed,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return RelayEnd::SourceFailed(err),
        };

        if let Err(err) = forward(sink, &chunk[..read], counters) {
            return RelayEnd::SinkFailed(err);
        }
    }
}

fn forward<W: Write>(sink: &mut W, bytes: &[u8], counters: &mut Counters) -> io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    sink.write_all(bytes)?;
    sink.flush()?;
    counters.bytes += bytes.len() as u64;
    Ok(())
}
