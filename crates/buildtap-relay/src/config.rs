use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use buildtap_frame::MAX_PAYLOAD_LIMIT;

use crate::channel::{RelayChannel, StreamRole};

/// Location of the build service the orchestrator normally launches.
pub const DEFAULT_SERVICE_PATH: &str = "/Applications/Xcode.app/Contents/SharedFrameworks/XCBuild.framework/PlugIns/XCBBuildService.bundle/Contents/MacOS/XCBBuildService";

/// Fixed, well-known record sink.
pub const DEFAULT_LOG_PATH: &str = "/tmp/xcode_xcbbuildservice.log";

/// Variable the orchestrator reads to find its build service.
pub const SELF_REFERENCE_VAR: &str = "XCBBUILDSERVICE_PATH";

/// How long to wait for output relays after the service exits.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Which streams are parsed into frames and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapSelection {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

impl TapSelection {
    pub fn channel(&self, role: StreamRole) -> RelayChannel {
        let observed = match role {
            StreamRole::Stdin => self.stdin,
            StreamRole::Stdout => self.stdout,
            StreamRole::Stderr => self.stderr,
        };
        RelayChannel { role, observed }
    }

    pub fn any(&self) -> bool {
        self.stdin || self.stdout || self.stderr
    }
}

impl Default for TapSelection {
    fn default() -> Self {
        Self {
            stdin: false,
            stdout: true,
            stderr: true,
        }
    }
}

/// Everything the proxy needs to launch and observe the service.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Executable to launch.
    pub service_path: PathBuf,
    /// Arguments passed through to the service.
    pub service_args: Vec<OsString>,
    /// Record sink location.
    pub log_path: PathBuf,
    /// Name of the variable pointing the child back at this executable.
    pub self_reference_var: String,
    pub tap: TapSelection,
    /// Frames declaring a larger payload switch that stream to plain copying.
    pub max_payload_size: usize,
    pub drain_timeout: Duration,
    /// Sync each record to disk before closing the sink file.
    pub fsync: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            service_path: PathBuf::from(DEFAULT_SERVICE_PATH),
            service_args: Vec::new(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            self_reference_var: SELF_REFERENCE_VAR.to_string(),
            tap: TapSelection::default(),
            max_payload_size: MAX_PAYLOAD_LIMIT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            fsync: true,
        }
    }
}
