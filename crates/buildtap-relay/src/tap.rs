//! Background decode-and-log worker for one observed stream.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use buildtap_frame::Frame;
use buildtap_payload::decode_message;

use crate::channel::StreamRole;
use crate::sink::{LogRecord, RecordSink};

/// Frames handed to a tap that have not reached the sink yet.
///
/// Shared with the launcher so it can wait for records of a relay it does
/// not join.
#[derive(Debug, Default)]
pub struct TapBacklog {
    pending: Mutex<u64>,
    idle: Condvar,
}

impl TapBacklog {
    fn push(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn pop(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    pub fn pending(&self) -> u64 {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every offered frame has been appended (or failed to
    /// append), or `timeout` passes. Returns whether the backlog is empty.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (pending, _) = self
            .idle
            .wait_timeout_while(pending, timeout, |pending| *pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *pending == 0
    }
}

/// Hands frames to a worker thread without ever blocking the relay.
///
/// The queue is unbounded: a burst is absorbed in memory and drained once
/// the worker catches up. Frames are logged in the order they were offered.
pub(crate) struct FrameTap {
    role: StreamRole,
    tx: Option<Sender<Frame>>,
    worker: Option<JoinHandle<()>>,
    backlog: Arc<TapBacklog>,
}

impl FrameTap {
    pub(crate) fn spawn(role: StreamRole, sink: Arc<RecordSink>, backlog: Arc<TapBacklog>) -> Self {
        let (tx, rx) = mpsc::channel::<Frame>();

        let worker_backlog = Arc::clone(&backlog);
        let worker = std::thread::Builder::new()
            .name(format!("tap-{}", role.name()))
            .spawn(move || {
                for frame in rx {
                    let record = LogRecord::from_message(role, decode_message(&frame));
                    if let Err(err) = sink.append(&record) {
                        tracing::debug!(stream = %role, error = %err, "record dropped");
                    }
                    worker_backlog.pop();
                }
            });

        match worker {
            Ok(handle) => Self {
                role,
                tx: Some(tx),
                worker: Some(handle),
                backlog,
            },
            Err(err) => {
                tracing::warn!(stream = %role, error = %err, "log tap unavailable");
                Self {
                    role,
                    tx: None,
                    worker: None,
                    backlog,
                }
            }
        }
    }

    pub(crate) fn offer(&mut self, frame: Frame) {
        let Some(tx) = &self.tx else {
            return;
        };

        self.backlog.push();
        if tx.send(frame).is_err() {
            self.backlog.pop();
            self.tx = None;
            tracing::warn!(stream = %self.role, "log tap worker gone, frames no longer logged");
        }
    }

    /// Close the queue and wait for pending records to be written.
    pub(crate) fn finish(mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!(stream = %self.role, "log tap worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "buildtap-tap-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn frames_are_logged_in_offer_order() {
        let dir = unique_temp_dir("order");
        let sink = Arc::new(RecordSink::new(dir.join("records.log")).with_fsync(false));
        let backlog = Arc::new(TapBacklog::default());
        let mut tap = FrameTap::spawn(StreamRole::Stdout, Arc::clone(&sink), Arc::clone(&backlog));

        for i in 0..100u64 {
            // positive fixint payload
            tap.offer(Frame::new(i, vec![(i % 128) as u8]));
        }
        tap.finish();
        assert_eq!(backlog.pending(), 0);

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let channels: Vec<u64> = contents
            .lines()
            .map(|line| {
                let json: serde_json::Value = serde_json::from_str(line).unwrap();
                json["channel_id"].as_u64().unwrap()
            })
            .collect();
        assert_eq!(channels, (0..100).collect::<Vec<_>>());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sink_failures_do_not_stop_the_worker() {
        let dir = unique_temp_dir("failing");
        let sink = Arc::new(RecordSink::new(dir.join("missing").join("records.log")));
        let backlog = Arc::new(TapBacklog::default());
        let mut tap = FrameTap::spawn(StreamRole::Stderr, sink, Arc::clone(&backlog));

        tap.offer(Frame::new(1, vec![0xc0]));
        tap.offer(Frame::new(2, vec![0xc0]));
        assert!(backlog.wait_idle(Duration::from_secs(5)));
        tap.finish();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn burst_larger_than_any_queue_is_fully_logged() {
        let dir = unique_temp_dir("burst");
        let sink = Arc::new(RecordSink::new(dir.join("records.log")).with_fsync(false));
        let backlog = Arc::new(TapBacklog::default());
        let mut tap = FrameTap::spawn(StreamRole::Stdout, Arc::clone(&sink), Arc::clone(&backlog));

        for i in 0..5000u64 {
            tap.offer(Frame::new(i, vec![0xc3]));
        }
        assert!(backlog.wait_idle(Duration::from_secs(60)));
        tap.finish();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 5000);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn wait_idle_times_out_while_records_are_pending() {
        let backlog = TapBacklog::default();
        backlog.push();
        assert!(!backlog.wait_idle(Duration::from_millis(20)));
        backlog.pop();
        assert!(backlog.wait_idle(Duration::from_millis(20)));
    }
}
