//! Supervisor configuration
//!
//! Built once by the binary from the command line and environment, then
//! handed to each component. Nothing below this module reads process-wide
//! environment state.

use std::ffi::OsString;
use std::path::PathBuf;

/// What to do when the syslog socket cannot be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BindFailure {
    /// Abort startup before the child is launched
    Fail,
    /// Log a warning and run without a collector
    Degrade,
}

/// Where forwarded signals are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ForwardTarget {
    /// kill(pid): the supervised process only
    #[default]
    Process,
    /// killpg(pgid): the whole process group of the child
    Group,
}

/// Runtime configuration for the supervisor
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the syslog datagram socket, collector disabled when unset
    pub syslog_socket: Option<PathBuf>,
    /// Verbose diagnostics of reaping and decoding
    pub debug: bool,
    /// Behavior when the syslog socket cannot be bound
    pub bind_failure: BindFailure,
    /// Register as child subreaper when not running as PID 1
    pub subreaper: bool,
    /// Delivery target for forwarded signals
    pub forward_target: ForwardTarget,
}

impl Config {
    /// Resolve the bind failure policy.
    ///
    /// An explicit choice wins. Otherwise a debug run fails loudly and a
    /// normal run degrades.
    pub fn bind_failure_for(explicit: Option<BindFailure>, debug: bool) -> BindFailure {
        match explicit {
            Some(policy) => policy,
            None if debug => BindFailure::Fail,
            None => BindFailure::Degrade,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            syslog_socket: None,
            debug: false,
            bind_failure: BindFailure::Degrade,
            subreaper: false,
            forward_target: ForwardTarget::Process,
        }
    }
}

/// The command the supervisor runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    /// Resolved path of the executable
    pub program: PathBuf,
    /// Full argument vector, argv[0] included
    pub args: Vec<OsString>,
}

impl ChildCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// argv[0] as it will be seen by the child
    pub fn arg0(&self) -> OsString {
        self.args
            .first()
            .cloned()
            .unwrap_or_else(|| self.program.clone().into_os_string())
    }
}
