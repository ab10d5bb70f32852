//! Embedded syslog relay
//!
//! Receives syslog datagrams on a local socket and prints one
//! `[hostname] [tag] message` line per decoded message on stdout.

mod collector;
mod parser;

pub use collector::{SyslogCollector, RECV_BUFFER_SIZE};
pub use parser::{parse, Framing, ParseError, StructuredElement, SyslogMessage};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SyslogError {
    #[error("Failed to remove stale socket {}: {source}", path.display())]
    RemoveStale {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind syslog socket {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
