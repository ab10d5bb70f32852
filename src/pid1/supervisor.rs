//! Startup ordering and the terminal wait
//!
//! Order matters:
//! 1. ignore SIGTTIN/SIGTTOU
//! 2. subscribe SIGCHLD and the forwarded set (nothing in the startup
//!    window may be lost)
//! 3. bind the syslog socket, if configured
//! 4. launch the child
//! 5. spawn the reaper (watching the child) and the forwarder
//! 6. wait for the reaper to hand over the child's status

use std::io::IsTerminal;

use tokio::sync::oneshot;

use super::forward::SignalForwarder;
use super::launch::{self, ignore_terminal_signals};
use super::reaper::{ReapStatus, ZombieReaper};
use super::signals::SignalListener;
use super::{register_subreaper, Pid1Error};
use crate::config::{ChildCommand, Config};
use crate::syslog::SyslogCollector;

/// Supervises exactly one child until it terminates
pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `command` to completion and return its terminal status.
    ///
    /// Must be called from within a tokio runtime. Background tasks are left
    /// running; the caller is expected to exit the process afterwards.
    pub async fn run(&self, command: &ChildCommand) -> Result<ReapStatus, Pid1Error> {
        if self.config.subreaper {
            register_subreaper();
        }

        ignore_terminal_signals().map_err(|e| Pid1Error::Signal(e.to_string()))?;

        let child_signals =
            SignalListener::child().map_err(|e| Pid1Error::Signal(e.to_string()))?;
        let forward_signals =
            SignalListener::forward().map_err(|e| Pid1Error::Signal(e.to_string()))?;

        if let Some(path) = &self.config.syslog_socket {
            match SyslogCollector::bind(path, self.config.bind_failure)? {
                Some(collector) => {
                    log::debug!("Relaying syslog from {}", path.display());
                    tokio::spawn(collector.run(tokio::io::stdout()));
                }
                None => log::debug!("Syslog relay disabled"),
            }
        }

        let foreground = std::io::stdin().is_terminal();
        let mut child = launch::launch(command, foreground)?;

        let (exit_tx, exit_rx) = oneshot::channel();
        let mut reaper = ZombieReaper::new(child_signals);
        reaper.watch(child.pid(), exit_tx);
        tokio::spawn(reaper.run());

        tokio::spawn(
            SignalForwarder::new(forward_signals, child.pid(), self.config.forward_target).run(),
        );

        let status = exit_rx.await.map_err(|_| Pid1Error::ReaperStopped)?;
        child.record_exit(status);
        log::debug!(
            "{} (PID {}) finished: {:?}, exiting with {}",
            child.command().program.display(),
            child.pid(),
            child.outcome(),
            status.exit_code()
        );

        Ok(status)
    }
}
