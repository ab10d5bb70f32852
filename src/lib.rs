//! syslog-init - Minimal init for containers
//!
//! Runs as PID 1 and supervises exactly one child:
//! - Starts it in its own (optionally foreground) process group
//! - Reaps every zombie reparented to us
//! - Forwards SIGTERM/SIGINT/SIGHUP/SIGUSR1/SIGUSR2 to it
//! - Exits with its exit code (128 + N when killed by signal N)
//! - Optionally relays syslog datagrams from a local socket to stdout
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   Supervisor                      │
//! ├────────────────┬────────────────┬────────────────┤
//! │ SIGCHLD queue  │ Forward queue  │ Syslog socket  │
//! │       │        │       │        │       │        │
//! │ ZombieReaper   │ SignalForwarder│ SyslogCollector│
//! │       │        │       │        │       │        │
//! │  child status  │  kill(child)   │    stdout      │
//! └────────────────┴────────────────┴────────────────┘
//! ```

pub mod config;
pub mod pid1;
pub mod syslog;

pub use config::{BindFailure, ChildCommand, Config, ForwardTarget};
pub use pid1::{Pid1Error, ReapStatus, Supervisor};
