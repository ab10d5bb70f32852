//! Signal relay to the supervised child
//!
//! The child leads its own process group, so `Group` mode reaches every
//! process that stayed in that group. Delivery failures (usually the child
//! is already gone) are logged and dropped.

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;

use super::signals::SignalListener;
use crate::config::ForwardTarget;

/// Forwards every event of a listener to one process
pub struct SignalForwarder {
    listener: SignalListener,
    pid: Pid,
    target: ForwardTarget,
}

impl SignalForwarder {
    pub fn new(listener: SignalListener, pid: Pid, target: ForwardTarget) -> Self {
        Self {
            listener,
            pid,
            target,
        }
    }

    /// Deliver a single signal
    pub fn forward(&self, signal: Signal) -> nix::Result<()> {
        match self.target {
            ForwardTarget::Process => kill(self.pid, signal),
            ForwardTarget::Group => killpg(self.pid, signal),
        }
    }

    /// Relay until the listener closes
    pub async fn run(mut self) {
        while let Some(event) = self.listener.recv().await {
            match self.forward(event.signal) {
                Ok(()) => log::debug!("Forwarded {} to {:?} {}", event.signal, self.target, self.pid),
                Err(e) => log::warn!("Unable to forward signal {}: {}", event.signal, e),
            }
        }
    }
}
