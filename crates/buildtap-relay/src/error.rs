use std::path::PathBuf;

/// Errors that prevent the build service from being launched or awaited.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The path of the running executable could not be resolved.
    #[error("cannot resolve own executable path: {0}")]
    CurrentExe(std::io::Error),

    /// The service process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// A relay worker thread could not be started.
    #[error("failed to start {stream} relay: {source}")]
    Worker {
        stream: &'static str,
        source: std::io::Error,
    },

    /// Waiting for the service to exit failed.
    #[error("failed to wait for service: {0}")]
    Wait(std::io::Error),
}

impl LaunchError {
    /// The underlying I/O error kind, when there is one.
    pub fn io_kind(&self) -> std::io::ErrorKind {
        match self {
            LaunchError::CurrentExe(err) | LaunchError::Wait(err) => err.kind(),
            LaunchError::Spawn { source, .. } | LaunchError::Worker { source, .. } => source.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;
