use std::ffi::OsString;

use buildtap_relay::run_with_self_reference;

use crate::cmd::{ProxyOptions, XcodebuildArgs};
use crate::exit::{launch_error, CliResult};

/// Run `xcrun xcodebuild ARGS` with the self-reference variable pointing at
/// this executable, so the build service it starts is the proxy.
pub fn run(args: XcodebuildArgs, options: &ProxyOptions) -> CliResult<i32> {
    let mut tool_args: Vec<OsString> = Vec::with_capacity(args.args.len() + 1);
    tool_args.push(OsString::from("xcodebuild"));
    tool_args.extend(args.args);

    tracing::info!(xcrun = %args.xcrun.display(), var = %options.self_env_var, "running xcodebuild");
    run_with_self_reference(&args.xcrun, tool_args, &options.self_env_var)
        .map_err(|err| launch_error("xcodebuild failed", err))
}
