//! Identity of the three relayed stdio streams.

use std::fmt;

/// Which child stream a relay serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    /// Local input forwarded to the child's stdin.
    Stdin,
    /// Child stdout forwarded to local output.
    Stdout,
    /// Child stderr forwarded to local error.
    Stderr,
}

impl StreamRole {
    pub const ALL: [StreamRole; 3] = [StreamRole::Stdin, StreamRole::Stdout, StreamRole::Stderr];

    /// Stable name used in log records and thread names.
    pub fn name(self) -> &'static str {
        match self {
            StreamRole::Stdin => "child-stdin",
            StreamRole::Stdout => "child-stdout",
            StreamRole::Stderr => "child-stderr",
        }
    }

    /// True when the child writes this stream and closes it on exit.
    pub fn is_child_output(self) -> bool {
        !matches!(self, StreamRole::Stdin)
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One direction of byte flow, and whether its frames are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayChannel {
    pub role: StreamRole,
    pub observed: bool,
}

impl RelayChannel {
    pub fn plain(role: StreamRole) -> Self {
        Self {
            role,
            observed: false,
        }
    }

    pub fn observed(role: StreamRole) -> Self {
        Self {
            role,
            observed: true,
        }
    }
}
