use std::fs::OpenOptions;
use std::path::Path;

use buildtap_relay::self_reference_path;
use serde::Serialize;

use crate::cmd::{DoctorArgs, ProxyOptions};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, options: &ProxyOptions, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        platform_check(),
        service_executable_check(&options.service),
        log_file_writable_check(&options.log_file),
        self_reference_check(&options.self_env_var),
        tap_selection_check(options),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("buildtap doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<20} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
    }
}

fn platform_check() -> CheckResult {
    if cfg!(target_os = "macos") {
        CheckResult::new("platform", CheckStatus::Pass, "macOS")
    } else {
        CheckResult::new(
            "platform",
            CheckStatus::Warn,
            format!(
                "{}: the build service only ships with Xcode on macOS",
                std::env::consts::OS
            ),
        )
    }
}

fn service_executable_check(path: &Path) -> CheckResult {
    const NAME: &str = "service_executable";

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            return CheckResult::new(NAME, CheckStatus::Fail, format!("{}: {err}", path.display()))
        }
    };

    if !metadata.is_file() {
        return CheckResult::new(
            NAME,
            CheckStatus::Fail,
            format!("{} is not a file", path.display()),
        );
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return CheckResult::new(
                NAME,
                CheckStatus::Fail,
                format!("{} is not executable", path.display()),
            );
        }
    }

    CheckResult::new(NAME, CheckStatus::Pass, path.display().to_string())
}

/// Opens the record log the same way the sink does, creating it if absent.
fn log_file_writable_check(path: &Path) -> CheckResult {
    const NAME: &str = "log_file_writable";

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(_) => CheckResult::new(NAME, CheckStatus::Pass, path.display().to_string()),
        Err(err) => CheckResult::new(NAME, CheckStatus::Fail, format!("{}: {err}", path.display())),
    }
}

fn self_reference_check(var: &str) -> CheckResult {
    const NAME: &str = "self_reference";

    match self_reference_path() {
        Ok(path) => CheckResult::new(
            NAME,
            CheckStatus::Pass,
            format!("{var}={}", path.display()),
        ),
        Err(err) => CheckResult::new(NAME, CheckStatus::Fail, err.to_string()),
    }
}

fn tap_selection_check(options: &ProxyOptions) -> CheckResult {
    let tap = options.tap_selection();
    let mut streams = Vec::new();
    if tap.stdin {
        streams.push("stdin");
    }
    if tap.stdout {
        streams.push("stdout");
    }
    if tap.stderr {
        streams.push("stderr");
    }
    let detail = if streams.is_empty() {
        "none (relay only)".to_string()
    } else {
        streams.join(", ")
    };
    CheckResult::new("tap_streams", CheckStatus::Info, detail)
}
