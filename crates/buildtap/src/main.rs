mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::{Command, ProxyOptions};
use crate::logging::{init_logging, LogFormat, LogLevel, LogTarget};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "buildtap",
    version,
    about = "Transparent logging proxy for the Xcode build service"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Diagnostics log format.
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        global = true,
        env = "BUILDTAP_LOG_FORMAT"
    )]
    log_format: LogFormat,

    /// Minimum diagnostics level.
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        global = true,
        env = "BUILDTAP_LOG_LEVEL"
    )]
    log_level: LogLevel,

    /// Write diagnostics to this file. In proxy mode diagnostics are
    /// discarded when unset, since stderr belongs to the service.
    #[arg(long, value_name = "PATH", global = true, env = "BUILDTAP_DIAGNOSTICS")]
    diagnostics: Option<PathBuf>,

    #[command(flatten)]
    proxy: ProxyOptions,

    #[command(subcommand)]
    command: Option<Command>,
}

fn main() {
    let cli = Cli::parse();

    let proxy_mode = matches!(cli.command, None | Some(Command::Proxy(_)));
    let target = match cli.diagnostics {
        Some(path) => LogTarget::File(path),
        None if proxy_mode => LogTarget::Discard,
        None => LogTarget::Stderr,
    };
    init_logging(cli.log_format, cli.log_level, target);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.proxy, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(code = err.code, "{err}");
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
