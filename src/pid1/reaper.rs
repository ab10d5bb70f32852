//! Zombie process reaping for PID 1
//!
//! When a process's parent dies, it gets reparented to PID 1.
//! PID 1 must call wait() to clean up these orphaned zombies.
//!
//! The reaper is the only caller of a wait-family primitive in the
//! supervisor. The supervised child's status is handed to whoever
//! registered interest in it through a one-shot channel, so no other task
//! ever races the reaper for that process table entry.
//!
//! SIGCHLD deliveries coalesce: one wake-up may stand for any number of
//! exited processes, so every wake-up drains until nothing is reapable.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tokio::sync::oneshot;

use super::signals::SignalListener;

/// Terminal status of a reaped process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapStatus {
    /// Process exited normally with code
    Exited(i32),
    /// Process killed by signal number
    Signaled(i32),
}

impl ReapStatus {
    /// Exit code the supervisor reports for this status.
    ///
    /// Normal exit maps to its own code, death by signal N maps to 128 + N.
    pub fn exit_code(self) -> i32 {
        match self {
            ReapStatus::Exited(code) => code,
            ReapStatus::Signaled(signal) => 128 + signal,
        }
    }
}

/// Resource usage of a reaped process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub user_time: Duration,
    pub system_time: Duration,
    /// Peak resident set size in KiB
    pub max_rss_kb: i64,
}

impl ResourceUsage {
    fn from_rusage(usage: &libc::rusage) -> Self {
        Self {
            user_time: timeval_to_duration(usage.ru_utime),
            system_time: timeval_to_duration(usage.ru_stime),
            max_rss_kb: usage.ru_maxrss as i64,
        }
    }
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    Duration::new(tv.tv_sec.max(0) as u64, (tv.tv_usec.max(0) as u32) * 1000)
}

/// Information about a reaped process
#[derive(Debug, Clone)]
pub struct ReapRecord {
    pub pid: Pid,
    pub status: ReapStatus,
    pub usage: ResourceUsage,
}

/// Result of one non-blocking wait
#[derive(Debug, Clone)]
pub enum ReapPoll {
    /// A terminated descendant was collected
    Reaped(ReapRecord),
    /// A state change that is not termination (stopped/continued)
    Skipped(Pid),
    /// Descendants exist but none has terminated
    NotReady,
    /// No descendants at all
    NoChildren,
}

/// Source of non-blocking "collect any terminated descendant" calls
pub trait WaitSource {
    fn wait_any(&mut self) -> nix::Result<ReapPoll>;
}

/// `wait4(-1, WNOHANG)` with resource accounting
#[derive(Debug, Default, Clone, Copy)]
pub struct Wait4;

impl WaitSource for Wait4 {
    fn wait_any(&mut self) -> nix::Result<ReapPoll> {
        let mut status: libc::c_int = 0;
        // SAFETY: all-zero is a valid rusage
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };

        loop {
            // SAFETY: both out-pointers refer to live locals
            let pid = unsafe { libc::wait4(-1, &mut status, libc::WNOHANG, &mut usage) };
            match pid {
                0 => return Ok(ReapPoll::NotReady),
                -1 => match Errno::last() {
                    Errno::EINTR => continue,
                    Errno::ECHILD => return Ok(ReapPoll::NoChildren),
                    e => return Err(e),
                },
                raw => {
                    let pid = Pid::from_raw(raw);
                    let status = match WaitStatus::from_raw(pid, status)? {
                        WaitStatus::Exited(_, code) => ReapStatus::Exited(code),
                        WaitStatus::Signaled(_, signal, _) => ReapStatus::Signaled(signal as i32),
                        _ => return Ok(ReapPoll::Skipped(pid)),
                    };
                    return Ok(ReapPoll::Reaped(ReapRecord {
                        pid,
                        status,
                        usage: ResourceUsage::from_rusage(&usage),
                    }));
                }
            }
        }
    }
}

/// Zombie process reaper
///
/// Runs a background task that reaps all zombie processes on every
/// SIGCHLD and reports the exit of one watched PID.
pub struct ZombieReaper<W = Wait4> {
    source: W,
    listener: SignalListener,
    /// The supervised child and where to send its status
    watched: Option<(Pid, oneshot::Sender<ReapStatus>)>,
}

impl ZombieReaper<Wait4> {
    /// Create a reaper woken by `listener`
    pub fn new(listener: SignalListener) -> Self {
        Self::with_source(listener, Wait4)
    }
}

impl<W: WaitSource> ZombieReaper<W> {
    pub fn with_source(listener: SignalListener, source: W) -> Self {
        Self {
            source,
            listener,
            watched: None,
        }
    }

    /// Report the termination of `pid` on `tx`, once
    pub fn watch(&mut self, pid: Pid, tx: oneshot::Sender<ReapStatus>) {
        self.watched = Some((pid, tx));
    }

    pub fn is_watching(&self) -> bool {
        self.watched.is_some()
    }

    /// Reap all available zombie processes (non-blocking)
    pub fn drain(&mut self) -> Vec<ReapRecord> {
        let mut reaped = Vec::new();

        loop {
            match self.source.wait_any() {
                Ok(ReapPoll::Reaped(record)) => {
                    log::debug!(
                        "Reaped PID {} ({:?}, user {:?}, sys {:?}, maxrss {} KiB)",
                        record.pid,
                        record.status,
                        record.usage.user_time,
                        record.usage.system_time,
                        record.usage.max_rss_kb
                    );
                    self.notify(&record);
                    reaped.push(record);
                }
                Ok(ReapPoll::Skipped(pid)) => {
                    log::debug!("PID {} changed state without exiting", pid);
                }
                // No more zombies, or no children at all
                Ok(ReapPoll::NotReady) | Ok(ReapPoll::NoChildren) => break,
                Err(e) => {
                    log::error!("wait4 error: {}", e);
                    break;
                }
            }
        }

        reaped
    }

    fn notify(&mut self, record: &ReapRecord) {
        let is_watched = matches!(&self.watched, Some((pid, _)) if *pid == record.pid);
        if !is_watched {
            return;
        }
        if let Some((pid, tx)) = self.watched.take() {
            log::debug!("Supervised PID {} terminated: {:?}", pid, record.status);
            // Receiver gone means nobody is waiting any more
            let _ = tx.send(record.status);
        }
    }

    /// Reap on every wake-up until the listener closes
    pub async fn run(mut self) {
        // Anything that exited before we started listening
        self.drain();

        while self.listener.recv().await.is_some() {
            self.drain();
        }

        log::debug!("Child signal listener closed, reaper exiting");
    }
}
