use std::ffi::OsString;

use buildtap_relay::{LocalEndpoints, ProcessLauncher, StreamRole};

use crate::cmd::ProxyOptions;
use crate::exit::{launch_error, CliResult};

/// Launch the build service and relay until it exits.
///
/// Returns the service's own exit code so the orchestrator sees exactly
/// what it would have seen without the proxy.
pub fn run(options: &ProxyOptions, service_args: Vec<OsString>) -> CliResult<i32> {
    let config = options.to_config(service_args)?;
    tracing::info!(
        service = %config.service_path.display(),
        log = %config.log_path.display(),
        "starting build service"
    );

    if let Err(err) = signals::install() {
        tracing::warn!(error = %err, "signal forwarding unavailable");
    }

    let launcher = ProcessLauncher::new(config);
    let service = launcher
        .launch(LocalEndpoints::stdio())
        .map_err(|err| launch_error("launch failed", err))?;
    signals::forward_to(service.id());

    let exit = service.wait();
    signals::forward_to(0);
    let exit = exit.map_err(|err| launch_error("service wait failed", err))?;

    for role in StreamRole::ALL {
        if let Some(report) = exit.report(role) {
            tracing::debug!(
                stream = %role,
                bytes = report.bytes_forwarded,
                frames = report.frames,
                "relay finished"
            );
        }
    }
    tracing::info!(code = exit.code(), "build service exited");
    Ok(exit.code())
}

/// SIGINT and SIGTERM received by the proxy are re-sent to the service, which
/// decides how to exit; the proxy then exits with the service's status.
#[cfg(unix)]
mod signals {
    use std::io;
    use std::sync::atomic::{AtomicI32, Ordering};

    const FORWARDED: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

    /// Zero while no service is running.
    static SERVICE_PID: AtomicI32 = AtomicI32::new(0);

    extern "C" fn forward(signal: libc::c_int) {
        let pid = SERVICE_PID.load(Ordering::SeqCst);
        // SAFETY: kill(2) and _exit(2) are async-signal-safe.
        unsafe {
            if pid > 0 {
                libc::kill(pid, signal);
            } else {
                libc::_exit(128 + signal);
            }
        }
    }

    pub fn install() -> io::Result<()> {
        for signal in FORWARDED {
            // SAFETY: the action is fully initialized before use and the
            // handler only calls async-signal-safe functions.
            let rc = unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = forward as extern "C" fn(libc::c_int) as libc::sighandler_t;
                action.sa_flags = libc::SA_RESTART;
                libc::sigemptyset(&mut action.sa_mask);
                libc::sigaction(signal, &action, std::ptr::null_mut())
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    pub fn forward_to(pid: u32) {
        SERVICE_PID.store(i32::try_from(pid).unwrap_or(0), Ordering::SeqCst);
    }
}

#[cfg(not(unix))]
mod signals {
    pub fn install() -> std::io::Result<()> {
        Ok(())
    }

    pub fn forward_to(_pid: u32) {}
}
