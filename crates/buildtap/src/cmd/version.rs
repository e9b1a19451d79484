use buildtap_relay::{DEFAULT_LOG_PATH, SELF_REFERENCE_VAR};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("buildtap {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: buildtap");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("BUILDTAP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("record_log: {DEFAULT_LOG_PATH}");
    println!("self_reference_var: {SELF_REFERENCE_VAR}");

    Ok(SUCCESS)
}
