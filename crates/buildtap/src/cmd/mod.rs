use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use buildtap_frame::MAX_PAYLOAD_LIMIT;
use buildtap_relay::{
    ProxyConfig, TapSelection, DEFAULT_LOG_PATH, DEFAULT_SERVICE_PATH, SELF_REFERENCE_VAR,
};
use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod doctor;
pub mod proxy;
pub mod version;
pub mod xcodebuild;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch the build service and relay stdio (default).
    Proxy(ProxyArgs),
    /// Run xcodebuild with this executable as its build service.
    Xcodebuild(XcodebuildArgs),
    /// Decode a captured framed stream and print its messages.
    Decode(DecodeArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Option<Command>, options: &ProxyOptions, format: OutputFormat) -> CliResult<i32> {
    match command {
        None => proxy::run(options, Vec::new()),
        Some(Command::Proxy(args)) => proxy::run(options, args.args),
        Some(Command::Xcodebuild(args)) => xcodebuild::run(args, options),
        Some(Command::Decode(args)) => decode::run(args, options, format),
        Some(Command::Doctor(args)) => doctor::run(args, options, format),
        Some(Command::Version(args)) => version::run(args),
    }
}

/// Proxy settings, accepted before or after any subcommand.
///
/// The orchestrator launches the proxy with no arguments, so every setting
/// also has an environment variable.
#[derive(Args, Debug, Clone)]
pub struct ProxyOptions {
    /// Build service executable to launch.
    #[arg(
        long,
        value_name = "PATH",
        global = true,
        env = "BUILDTAP_SERVICE",
        default_value = DEFAULT_SERVICE_PATH
    )]
    pub service: PathBuf,

    /// Append decoded frames to this JSON-lines file.
    #[arg(
        long,
        value_name = "PATH",
        global = true,
        env = "BUILDTAP_LOG_FILE",
        default_value = DEFAULT_LOG_PATH
    )]
    pub log_file: PathBuf,

    /// Also parse and log frames sent to the service.
    #[arg(long, global = true, env = "BUILDTAP_TAP_STDIN")]
    pub tap_stdin: bool,

    /// Relay service stdout without logging it.
    #[arg(long, global = true, env = "BUILDTAP_NO_TAP_STDOUT")]
    pub no_tap_stdout: bool,

    /// Relay service stderr without logging it.
    #[arg(long, global = true, env = "BUILDTAP_NO_TAP_STDERR")]
    pub no_tap_stderr: bool,

    /// Largest payload parsed as a frame; larger headers stop parsing on that stream.
    #[arg(long, value_name = "BYTES", global = true, env = "BUILDTAP_MAX_PAYLOAD")]
    pub max_payload: Option<usize>,

    /// How long to wait for output to drain after the service exits (e.g. 5s, 500ms).
    #[arg(
        long,
        value_name = "DURATION",
        global = true,
        env = "BUILDTAP_DRAIN_TIMEOUT",
        default_value = "5s"
    )]
    pub drain_timeout: String,

    /// Skip syncing each record to disk.
    #[arg(long, global = true, env = "BUILDTAP_NO_FSYNC")]
    pub no_fsync: bool,

    /// Variable that points the service back at this executable.
    #[arg(
        long,
        value_name = "NAME",
        global = true,
        env = "BUILDTAP_SELF_ENV_VAR",
        default_value = SELF_REFERENCE_VAR
    )]
    pub self_env_var: String,
}

impl ProxyOptions {
    pub fn max_payload_size(&self) -> usize {
        self.max_payload.unwrap_or(MAX_PAYLOAD_LIMIT)
    }

    pub fn tap_selection(&self) -> TapSelection {
        TapSelection {
            stdin: self.tap_stdin,
            stdout: !self.no_tap_stdout,
            stderr: !self.no_tap_stderr,
        }
    }

    pub fn to_config(&self, service_args: Vec<OsString>) -> CliResult<ProxyConfig> {
        if self.self_env_var.is_empty() {
            return Err(CliError::new(USAGE, "self reference variable must not be empty"));
        }
        Ok(ProxyConfig {
            service_path: self.service.clone(),
            service_args,
            log_path: self.log_file.clone(),
            self_reference_var: self.self_env_var.clone(),
            tap: self.tap_selection(),
            max_payload_size: self.max_payload_size(),
            drain_timeout: parse_duration(&self.drain_timeout)?,
            fsync: !self.no_fsync,
        })
    }
}

#[derive(Args, Debug)]
pub struct ProxyArgs {
    /// Arguments passed to the build service.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}

#[derive(Args, Debug)]
pub struct XcodebuildArgs {
    /// xcrun executable used to locate xcodebuild.
    #[arg(
        long,
        value_name = "PATH",
        env = "BUILDTAP_XCRUN",
        default_value = "/usr/bin/xcrun"
    )]
    pub xcrun: PathBuf,

    /// Arguments passed to xcodebuild.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Captured stream to read, or `-` for stdin.
    #[arg(value_name = "FILE", default_value = "-")]
    pub input: PathBuf,

    /// Only print frames on these channels (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u64>>,

    /// Stop after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_zero_and_garbage() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
