//! PID 1 functionality
//!
//! Handles responsibilities specific to running as init (PID 1):
//! - Launching the supervised child in its own process group
//! - Zombie process reaping
//! - Signal forwarding to the child
//! - Propagating the child's exit status

mod forward;
mod launch;
mod reaper;
mod signals;
mod supervisor;

pub use forward::SignalForwarder;
pub use launch::{
    ignore_terminal_signals, launch, resolve_executable, LaunchError, Outcome, SupervisedProcess,
};
pub use reaper::{
    ReapPoll, ReapRecord, ReapStatus, ResourceUsage, Wait4, WaitSource, ZombieReaper,
};
pub use signals::{SignalEvent, SignalListener, SignalQueue, FORWARDED_SIGNALS, QUEUE_CAPACITY};
pub use supervisor::Supervisor;

use std::process;

use crate::syslog::SyslogError;

/// Check if we are running as PID 1
pub fn is_pid1() -> bool {
    process::id() == 1
}

/// Become the reaper of orphaned descendants when not running as PID 1.
///
/// Failure only costs orphan reaping, so it is logged and ignored.
pub fn register_subreaper() {
    if is_pid1() {
        log::debug!("Running as PID 1, subreaper not needed");
        return;
    }

    match nix::sys::prctl::set_child_subreaper(true) {
        Ok(()) => log::debug!("Registered as child subreaper (pid={})", process::id()),
        Err(e) => log::warn!("Failed to register as child subreaper: {}", e),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Pid1Error {
    #[error("Signal setup failed: {0}")]
    Signal(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Syslog(#[from] SyslogError),

    #[error("Zombie reaper stopped before the child exited")]
    ReaperStopped,
}
