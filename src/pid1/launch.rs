//! Child process launch
//!
//! The supervised child gets its own process group (pgid == pid) and, when
//! the supervisor's stdin is a terminal, becomes the terminal's foreground
//! group so keyboard signals reach it directly.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::Pid;

use super::reaper::ReapStatus;
use crate::config::ChildCommand;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Unable to find [{0}] in PATH")]
    NotFound(String),

    #[error("Failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lifecycle of the supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    ExitedWithCode(i32),
    TerminatedBySignal(i32),
}

/// The single child this supervisor is responsible for
#[derive(Debug)]
pub struct SupervisedProcess {
    pid: Pid,
    pgid: Pid,
    command: ChildCommand,
    foreground: bool,
    outcome: Outcome,
}

impl SupervisedProcess {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    pub fn command(&self) -> &ChildCommand {
        &self.command
    }

    /// Whether the child was made the terminal's foreground group
    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Record the terminal status. Only the first call has any effect.
    pub fn record_exit(&mut self, status: ReapStatus) -> bool {
        if self.outcome != Outcome::Pending {
            return false;
        }
        self.outcome = match status {
            ReapStatus::Exited(code) => Outcome::ExitedWithCode(code),
            ReapStatus::Signaled(signal) => Outcome::TerminatedBySignal(signal),
        };
        true
    }
}

/// Find `name` the way a shell would.
///
/// Names containing a slash are taken as paths. Everything else is looked
/// up in each `PATH` entry, an empty entry meaning the current directory.
pub fn resolve_executable(name: &OsStr, path_var: Option<&OsStr>) -> Result<PathBuf, LaunchError> {
    let not_found = || LaunchError::NotFound(name.to_string_lossy().into_owned());

    if name.is_empty() {
        return Err(not_found());
    }

    if name.as_bytes().contains(&b'/') {
        let path = PathBuf::from(name);
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(not_found())
        };
    }

    let path_var = path_var.ok_or_else(not_found)?;
    for dir in std::env::split_paths(path_var) {
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }

    Err(not_found())
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Ignore SIGTTIN/SIGTTOU so background terminal I/O never stops us
pub fn ignore_terminal_signals() -> nix::Result<()> {
    // SAFETY: installing SIG_IGN does not run any handler code
    unsafe {
        signal(Signal::SIGTTIN, SigHandler::SigIgn)?;
        signal(Signal::SIGTTOU, SigHandler::SigIgn)?;
    }
    Ok(())
}

/// Start the child in its own process group with inherited stdio
pub fn launch(command: &ChildCommand, foreground: bool) -> Result<SupervisedProcess, LaunchError> {
    let mut cmd = Command::new(&command.program);
    cmd.arg0(command.arg0());
    cmd.args(command.args.iter().skip(1));
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());
    cmd.process_group(0);

    // SAFETY: only async-signal-safe libc calls between fork and exec
    unsafe {
        cmd.pre_exec(move || {
            if foreground && libc::tcsetpgrp(libc::STDIN_FILENO, libc::getpid()) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            // Ignored dispositions survive exec
            libc::signal(libc::SIGTTIN, libc::SIG_DFL);
            libc::signal(libc::SIGTTOU, libc::SIG_DFL);
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        program: command.program.clone(),
        source,
    })?;

    // The reaper collects the status; the handle is not waited on
    let pid = Pid::from_raw(child.id() as i32);
    drop(child);

    log::debug!(
        "Started {} as PID {} (foreground: {})",
        command.program.display(),
        pid,
        foreground
    );

    Ok(SupervisedProcess {
        pid,
        pgid: pid,
        command: command.clone(),
        foreground,
        outcome: Outcome::Pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::getpgid;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_test_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = PathBuf::from(format!("/tmp/syslog-init-launch-{}-{}", std::process::id(), id));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_resolve_from_path() {
        let path = resolve_executable(OsStr::new("sh"), Some(OsStr::new("/nonexistent:/bin:/usr/bin")))
            .unwrap();
        assert!(path.ends_with("sh"));
        assert!(path.is_absolute());
    }

    #[test]
    fn test_resolve_missing() {
        let err = resolve_executable(
            OsStr::new("no-such-command-for-syslog-init"),
            Some(OsStr::new("/bin:/usr/bin")),
        )
        .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound(ref n) if n == "no-such-command-for-syslog-init"));
    }

    #[test]
    fn test_resolve_without_path_var() {
        assert!(resolve_executable(OsStr::new("sh"), None).is_err());
        assert!(resolve_executable(OsStr::new("/bin/sh"), None).is_ok());
    }

    #[test]
    fn test_resolve_skips_non_executable() {
        let dir = unique_test_dir();
        let file = dir.join("tool");
        std::fs::write(&file, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(resolve_executable(OsStr::new("tool"), Some(dir.as_os_str())).is_err());
        assert!(resolve_executable(file.as_os_str(), None).is_err());

        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(
            resolve_executable(OsStr::new("tool"), Some(dir.as_os_str())).unwrap(),
            file
        );
    }

    #[test]
    fn test_resolve_skips_directories() {
        let dir = unique_test_dir();
        std::fs::create_dir(dir.join("tool")).unwrap();
        assert!(resolve_executable(OsStr::new("tool"), Some(dir.as_os_str())).is_err());
    }

    #[test]
    fn test_launch_own_process_group() {
        let cmd = ChildCommand::new("/bin/sleep", vec!["sleep".into(), "30".into()]);
        let child = launch(&cmd, false).unwrap();

        assert_eq!(getpgid(Some(child.pid())).unwrap(), child.pid());
        assert_eq!(child.pgid(), child.pid());
        assert!(!child.is_foreground());
        assert_eq!(child.outcome(), Outcome::Pending);

        nix::sys::signal::kill(child.pid(), Signal::SIGKILL).unwrap();
        waitpid(child.pid(), None).unwrap();
    }

    #[test]
    fn test_launch_passes_arguments() {
        let cmd = ChildCommand::new(
            "/bin/sh",
            vec!["sh".into(), "-c".into(), "exit $#".into(), "zero".into(), "a".into(), "b".into()],
        );
        let child = launch(&cmd, false).unwrap();
        assert_eq!(
            waitpid(child.pid(), None).unwrap(),
            WaitStatus::Exited(child.pid(), 2)
        );
    }

    #[test]
    fn test_launch_failure() {
        let cmd = ChildCommand::new("/nonexistent/syslog-init-child", vec!["child".into()]);
        let err = launch(&cmd, false).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }

    #[test]
    fn test_outcome_recorded_once() {
        let cmd = ChildCommand::new("/bin/true", vec!["true".into()]);
        let mut child = launch(&cmd, false).unwrap();
        waitpid(child.pid(), None).unwrap();

        assert!(child.record_exit(ReapStatus::Exited(3)));
        assert!(!child.record_exit(ReapStatus::Signaled(9)));
        assert_eq!(child.outcome(), Outcome::ExitedWithCode(3));
    }
}
