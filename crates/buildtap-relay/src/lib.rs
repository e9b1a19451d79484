//! Transparent stdio relay between a build orchestrator and the build
//! service it launches.
//!
//! [`ProcessLauncher`] spawns the service with three pipes and runs one
//! [`DuplexRelay`] per direction. Observed relays also parse frames and hand
//! them to a background tap that decodes and appends them to the
//! [`RecordSink`]. Forwarding never waits on decoding or logging.

pub mod channel;
pub mod config;
pub mod error;
pub mod launcher;
pub mod relay;
pub mod sink;
mod tap;

pub use channel::{RelayChannel, StreamRole};
pub use config::{
    ProxyConfig, TapSelection, DEFAULT_DRAIN_TIMEOUT, DEFAULT_LOG_PATH, DEFAULT_SERVICE_PATH,
    SELF_REFERENCE_VAR,
};
pub use error::{LaunchError, Result};
pub use launcher::{
    run_with_self_reference, self_reference_path, LocalEndpoints, ProcessLauncher,
    RunningService, ServiceExit,
};
pub use relay::{DuplexRelay, RelayEnd, RelayReport};
pub use sink::{LogRecord, RecordOutcome, RecordSink};
pub use tap::TapBacklog;
