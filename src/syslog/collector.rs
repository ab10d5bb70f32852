//! Syslog socket listener
//!
//! Binds a datagram socket that unprivileged children can write to and
//! relays decoded messages to a writer (stdout in production).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::sys::stat::{umask, Mode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UnixDatagram;

use super::parser;
use super::SyslogError;
use crate::config::BindFailure;

/// Largest datagram accepted in one receive
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Owns the bound syslog socket
pub struct SyslogCollector {
    socket: UnixDatagram,
    path: PathBuf,
}

impl SyslogCollector {
    /// Replace any stale file at `path` and bind a fresh socket.
    ///
    /// Returns `Ok(None)` when binding failed and `on_failure` is
    /// [`BindFailure::Degrade`]. Must be called from within a tokio runtime.
    pub fn bind(path: &Path, on_failure: BindFailure) -> Result<Option<Self>, SyslogError> {
        remove_stale(path)?;

        match bind_permissive(path) {
            Ok(socket) => {
                log::debug!("Syslog socket bound at {}", path.display());
                Ok(Some(Self {
                    socket,
                    path: path.to_path_buf(),
                }))
            }
            Err(source) => match on_failure {
                BindFailure::Fail => Err(SyslogError::Bind {
                    path: path.to_path_buf(),
                    source,
                }),
                BindFailure::Degrade => {
                    log::warn!(
                        "Failed to bind syslog socket {}: {} (syslog relay disabled)",
                        path.display(),
                        source
                    );
                    Ok(None)
                }
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Relay datagrams to `out` until receiving or writing fails
    pub async fn run<W: AsyncWrite + Unpin>(self, mut out: W) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let len = match self.socket.recv(&mut buf).await {
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("Syslog socket error: {}", e);
                    break;
                }
            };

            let Some(line) = decode_line(&buf[..len]) else {
                continue;
            };

            if let Err(e) = write_line(&mut out, &line).await {
                log::error!("Failed to write syslog line: {}", e);
                break;
            }
        }
    }
}

impl Drop for SyslogCollector {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Decode one datagram into an output line, dropping what cannot be shown
fn decode_line(datagram: &[u8]) -> Option<String> {
    match parser::parse(datagram) {
        Ok(msg) => {
            let line = msg.to_line();
            if line.is_none() {
                log::debug!("Syslog message without body dropped ({:?})", msg.framing);
            }
            line
        }
        Err(e) => {
            log::debug!("Dropping syslog datagram ({} bytes): {}", datagram.len(), e);
            None
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> std::io::Result<()> {
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    out.write_all(&bytes).await?;
    out.flush().await
}

fn remove_stale(path: &Path) -> Result<(), SyslogError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SyslogError::RemoveStale {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Bind with an empty umask so any local user may send to the socket
fn bind_permissive(path: &Path) -> std::io::Result<UnixDatagram> {
    let previous = umask(Mode::empty());
    let socket = UnixDatagram::bind(path);
    umask(previous);
    socket
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader, Lines};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_test_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = PathBuf::from(format!("/tmp/syslog-init-collector-{}-{}", std::process::id(), id));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn send(path: &Path, datagram: &[u8]) {
        let client = std::os::unix::net::UnixDatagram::unbound().unwrap();
        client.send_to(datagram, path).unwrap();
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(
            decode_line(b"<34>1 2003-10-11T22:14:15.003Z h t - - - hello").as_deref(),
            Some("h t hello")
        );
        assert_eq!(decode_line(b"<13>world").as_deref(), Some("world"));
        assert_eq!(decode_line(b"not syslog"), None);
        assert_eq!(decode_line(b"<13>1 2003-10-11T22:14:15Z h t - - -"), None);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_file() {
        let dir = unique_test_dir();
        let path = dir.join("log.sock");
        std::fs::write(&path, "left over from a previous run").unwrap();

        let collector = SyslogCollector::bind(&path, BindFailure::Fail)
            .unwrap()
            .expect("collector");
        assert_eq!(collector.path(), path);

        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_socket());
        assert_eq!(meta.permissions().mode() & 0o777, 0o777);

        drop(collector);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_failure_policies() {
        let path = PathBuf::from("/nonexistent-syslog-init-dir/log.sock");

        let err = SyslogCollector::bind(&path, BindFailure::Fail).err().expect("should fail");
        assert!(matches!(err, SyslogError::Bind { .. }));

        let degraded = SyslogCollector::bind(&path, BindFailure::Degrade);
        assert!(matches!(degraded, Ok(None)));
    }

    #[tokio::test]
    async fn test_unremovable_stale_path_is_fatal() {
        let dir = unique_test_dir();
        let path = dir.join("log.sock");
        std::fs::create_dir(&path).unwrap();

        let err = SyslogCollector::bind(&path, BindFailure::Degrade).err().expect("should fail");
        assert!(matches!(err, SyslogError::RemoveStale { .. }));
    }

    #[tokio::test]
    async fn test_relays_and_survives_garbage() {
        let dir = unique_test_dir();
        let path = dir.join("log.sock");
        let collector = SyslogCollector::bind(&path, BindFailure::Fail)
            .unwrap()
            .expect("collector");

        let (writer, reader) = tokio::io::duplex(4096);
        tokio::spawn(collector.run(writer));

        send(&path, b"garbage without a header");
        send(&path, b"<34>1 2003-10-11T22:14:15.003Z h t - - - hello");
        send(&path, b"<13>1 2003-10-11T22:14:15Z h t - - -");
        send(&path, b"<13>world\n");

        let mut lines = BufReader::new(reader).lines();
        assert_eq!(next_line(&mut lines).await, "h t hello");
        assert_eq!(next_line(&mut lines).await, "world");
    }

    async fn next_line<R: tokio::io::AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> String {
        tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("timed out")
            .unwrap()
            .expect("stream ended")
    }
}
