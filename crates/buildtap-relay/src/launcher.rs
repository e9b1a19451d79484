use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use buildtap_frame::FrameConfig;

use crate::channel::StreamRole;
use crate::config::ProxyConfig;
use crate::error::{LaunchError, Result};
use crate::relay::{DuplexRelay, RelayEnd, RelayReport};
use crate::sink::RecordSink;
use crate::tap::TapBacklog;

/// The proxy's own side of the three relayed streams.
pub struct LocalEndpoints {
    pub input: Box<dyn Read + Send>,
    pub output: Box<dyn Write + Send>,
    pub error: Box<dyn Write + Send>,
}

impl LocalEndpoints {
    /// This process's stdin, stdout and stderr.
    pub fn stdio() -> Self {
        Self {
            input: Box::new(io::stdin()),
            output: Box::new(io::stdout()),
            error: Box::new(io::stderr()),
        }
    }
}

/// Spawns the build service behind three relays.
pub struct ProcessLauncher {
    config: ProxyConfig,
}

impl ProcessLauncher {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Start the service and one relay per stream.
    ///
    /// The child inherits this process's environment plus the self-reference
    /// variable naming this executable.
    pub fn launch(&self, local: LocalEndpoints) -> Result<RunningService> {
        let config = &self.config;
        let self_path = self_reference_path()?;

        let mut child = Command::new(&config.service_path)
            .args(&config.service_args)
            .env(&config.self_reference_var, &self_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: config.service_path.clone(),
                source,
            })?;

        tracing::info!(
            pid = child.id(),
            service = %config.service_path.display(),
            "service started"
        );

        let (Some(child_stdin), Some(child_stdout), Some(child_stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            abandon(&mut child);
            return Err(LaunchError::Spawn {
                program: config.service_path.clone(),
                source: io::Error::other("child stdio pipes unavailable"),
            });
        };

        let records = config
            .tap
            .any()
            .then(|| Arc::new(RecordSink::new(&config.log_path).with_fsync(config.fsync)));

        let (done_tx, done_rx) = mpsc::channel();
        let relays = [
            self.spawn_relay(StreamRole::Stdin, local.input, child_stdin, &records, &done_tx),
            self.spawn_relay(StreamRole::Stdout, child_stdout, local.output, &records, &done_tx),
            self.spawn_relay(StreamRole::Stderr, child_stderr, local.error, &records, &done_tx),
        ];
        let mut backlogs = Vec::new();
        for (role, result) in StreamRole::ALL.into_iter().zip(relays) {
            match result {
                Ok(Some(backlog)) => backlogs.push((role, backlog)),
                Ok(None) => {}
                Err(err) => {
                    abandon(&mut child);
                    return Err(err);
                }
            }
        }

        Ok(RunningService {
            child,
            done: done_rx,
            backlogs,
            drain_timeout: config.drain_timeout,
        })
    }

    fn spawn_relay<R, W>(
        &self,
        role: StreamRole,
        source: R,
        sink: W,
        records: &Option<Arc<RecordSink>>,
        done: &Sender<RelayReport>,
    ) -> Result<Option<Arc<TapBacklog>>>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let channel = self.config.tap.channel(role);
        let mut relay = DuplexRelay::new(channel, source, sink).with_frame_config(FrameConfig {
            max_payload_size: self.config.max_payload_size,
        });
        if let (true, Some(records)) = (channel.observed, records) {
            relay = relay.with_record_sink(Arc::clone(records));
        }
        let backlog = relay.backlog();

        let done = done.clone();
        std::thread::Builder::new()
            .name(format!("relay-{}", role.name()))
            .spawn(move || {
                let _ = done.send(relay.run());
            })
            .map(|_| backlog)
            .map_err(|source| LaunchError::Worker {
                stream: role.name(),
                source,
            })
    }
}

fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// A launched service whose relays are running.
pub struct RunningService {
    child: Child,
    done: Receiver<RelayReport>,
    backlogs: Vec<(StreamRole, Arc<TapBacklog>)>,
    drain_timeout: Duration,
}

impl RunningService {
    /// OS process ID of the service.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Block until the service exits, then give its output relays up to the
    /// drain timeout to forward what is left in the pipes.
    ///
    /// The stdin relay is not awaited, since it only ends when local input
    /// closes, but records it has already queued are flushed within the same
    /// deadline.
    pub fn wait(mut self) -> Result<ServiceExit> {
        let status = self.child.wait().map_err(LaunchError::Wait)?;
        tracing::info!(%status, "service exited");

        let deadline = Instant::now() + self.drain_timeout;
        let mut reports = Vec::new();
        let mut outstanding = StreamRole::ALL
            .iter()
            .filter(|role| role.is_child_output())
            .count();

        while outstanding > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done.recv_timeout(remaining) {
                Ok(report) => {
                    if report.channel.role.is_child_output() {
                        outstanding -= 1;
                    }
                    reports.push(report);
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(outstanding, "output relays still running after drain timeout");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        reports.extend(self.done.try_iter());

        for (role, backlog) in &self.backlogs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !backlog.wait_idle(remaining) {
                tracing::warn!(
                    stream = %role,
                    pending = backlog.pending(),
                    "records still queued after drain timeout"
                );
            }
        }

        for report in &reports {
            if let RelayEnd::SinkFailed(err) = &report.end {
                tracing::warn!(stream = %report.channel.role, error = %err, "relay stopped early");
            }
        }

        Ok(ServiceExit { status, reports })
    }
}

/// Outcome of a completed service run.
#[derive(Debug)]
pub struct ServiceExit {
    pub status: ExitStatus,
    pub reports: Vec<RelayReport>,
}

impl ServiceExit {
    /// Exit code to propagate: the child's own code, or 128 + signal number
    /// when it was killed by a signal.
    pub fn code(&self) -> i32 {
        exit_code(self.status)
    }

    pub fn report(&self, role: StreamRole) -> Option<&RelayReport> {
        self.reports.iter().find(|r| r.channel.role == role)
    }
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

/// Absolute path of the running executable.
pub fn self_reference_path() -> Result<PathBuf> {
    let path = std::env::current_exe().map_err(LaunchError::CurrentExe)?;
    Ok(std::fs::canonicalize(&path).unwrap_or(path))
}

/// Run `program` with inherited stdio and the self-reference variable set,
/// so whatever it launches as its build service comes back through this
/// executable. Returns the exit code to propagate.
pub fn run_with_self_reference<I, S>(program: &Path, args: I, var: &str) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let self_path = self_reference_path()?;
    tracing::debug!(program = %program.display(), %var, self_path = %self_path.display(), "running tool");

    let status = Command::new(program)
        .args(args)
        .env(var, &self_path)
        .status()
        .map_err(|source| LaunchError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

    Ok(exit_code(status))
}
