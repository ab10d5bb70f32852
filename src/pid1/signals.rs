//! Signal listeners
//!
//! Converts asynchronous signal delivery into an ordered, buffered queue of
//! events. Two listeners are used by the supervisor:
//! - SIGCHLD: wakes the zombie reaper
//! - SIGTERM/SIGINT/SIGHUP/SIGUSR1/SIGUSR2: relayed to the child
//!
//! Handlers are installed when the listener is created, so anything
//! delivered between `subscribe` and the first `recv` is kept.

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

/// Capacity of each listener queue
pub const QUEUE_CAPACITY: usize = 1024;

/// Signals relayed to the supervised process
pub const FORWARDED_SIGNALS: [Signal; 5] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGHUP,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

/// Which listener an event arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalQueue {
    /// Child termination (SIGCHLD)
    Child,
    /// Signals to forward to the child
    Forward,
}

/// A single signal delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    pub signal: Signal,
    pub queue: SignalQueue,
}

/// Buffered subscription to a fixed set of signals
pub struct SignalListener {
    queue: SignalQueue,
    rx: mpsc::Receiver<SignalEvent>,
}

impl SignalListener {
    /// Subscribe to `signals`, delivering events tagged with `queue`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(queue: SignalQueue, signals: &[Signal]) -> std::io::Result<Self> {
        // Install every handler before spawning anything
        let mut streams = Vec::with_capacity(signals.len());
        for &sig in signals {
            streams.push((sig, signal(SignalKind::from_raw(sig as i32))?));
        }

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        for (sig, mut stream) in streams {
            let tx = tx.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    let event = SignalEvent { signal: sig, queue };
                    if tx.send(event).await.is_err() {
                        // Listener dropped
                        break;
                    }
                }
            });
        }

        Ok(Self { queue, rx })
    }

    /// Listener for child termination
    pub fn child() -> std::io::Result<Self> {
        Self::subscribe(SignalQueue::Child, &[Signal::SIGCHLD])
    }

    /// Listener for the forwarded signal set
    pub fn forward() -> std::io::Result<Self> {
        Self::subscribe(SignalQueue::Forward, &FORWARDED_SIGNALS)
    }

    /// Wait for the next signal
    pub async fn recv(&mut self) -> Option<SignalEvent> {
        self.rx.recv().await
    }

    pub fn queue(&self) -> SignalQueue {
        self.queue
    }

    /// Listener fed by a plain channel instead of OS signals
    #[cfg(test)]
    pub(crate) fn from_channel(queue: SignalQueue) -> (mpsc::Sender<SignalEvent>, Self) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (tx, Self { queue, rx })
    }
}
