//! Durable, append-only record sink.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use buildtap_payload::{DecodedMessage, MessageBody, Value};
use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::channel::StreamRole;

/// One line in the record sink.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp_ms: u64,
    pub stream: &'static str,
    pub channel_id: u64,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Decoded {
        values: Vec<Value>,
    },
    Undecodable {
        error: String,
        #[serde(serialize_with = "serialize_base64")]
        raw: Bytes,
        raw_len: usize,
    },
}

impl LogRecord {
    /// Build a record for a message seen on `stream`, stamped now.
    pub fn from_message(stream: StreamRole, message: DecodedMessage) -> Self {
        let outcome = match message.body {
            MessageBody::Values(values) => RecordOutcome::Decoded { values },
            MessageBody::Undecodable { reason, raw } => RecordOutcome::Undecodable {
                error: reason,
                raw_len: raw.len(),
                raw,
            },
        };

        Self {
            timestamp_ms: now_unix_millis(),
            stream: stream.name(),
            channel_id: message.channel,
            outcome,
        }
    }
}

fn serialize_base64<S: Serializer>(raw: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(raw))
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Append-only JSON-lines file shared by every relay.
///
/// Each record is written with a single `write_all` while holding the lock,
/// and the file is reopened and closed per record, so lines are never
/// interleaved and survive abrupt termination.
#[derive(Debug)]
pub struct RecordSink {
    path: PathBuf,
    fsync: bool,
    lock: Mutex<()>,
}

impl RecordSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fsync: true,
            lock: Mutex::new(()),
        }
    }

    /// Toggle syncing each record to disk before the file is closed.
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    pub fn append(&self, record: &LogRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        if self.fsync {
            file.sync_data()?;
        }
        Ok(())
    }
}
