//! Bounded execution of delegated tools.
//!
//! Sync-tool backends shell out to `git`, `hg`, `svn` or `rsync`. Every
//! invocation is bounded by the transport timeout: the child is polled and
//! killed once the deadline passes. stderr is spooled to an anonymous temp
//! file so a chatty tool cannot block on a full pipe.

use std::env;
use std::ffi::OsStr;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::TransportError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run `cmd` to completion, killing it after `timeout`.
///
/// Succeeds only on a zero exit status.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<(), TransportError> {
    let tool = cmd.get_program().to_string_lossy().to_string();
    let io_err = |source: std::io::Error| TransportError::Io {
        path: tool.clone(),
        source,
    };

    let mut stderr_spool = tempfile::tempfile().map_err(io_err)?;
    let stderr_handle = stderr_spool.try_clone().map_err(io_err)?;

    tracing::debug!(command = ?cmd, "running sync tool");

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_handle))
        .spawn()
        .map_err(io_err)?;

    let start = Instant::now();
    let status = loop {
        match child.try_wait().map_err(io_err)? {
            Some(status) => break status,
            None if start.elapsed() >= timeout => {
                // already-exited races are fine to ignore
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransportError::Timeout {
                    tool: tool.clone(),
                    after: timeout,
                });
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    };

    if status.success() {
        return Ok(());
    }

    let mut stderr = String::new();
    stderr_spool.seek(SeekFrom::Start(0)).map_err(io_err)?;
    stderr_spool.read_to_string(&mut stderr).map_err(io_err)?;

    Err(TransportError::Tool {
        tool: tool.clone(),
        status: status.to_string(),
        stderr: stderr.trim().to_string(),
    })
}

/// Locate an executable the way a shell would.
///
/// A name containing a path separator is checked directly.
pub fn find_in_path(binary: impl AsRef<OsStr>) -> Option<PathBuf> {
    let binary = Path::new(binary.as_ref());
    if binary.components().count() > 1 {
        return is_executable(binary).then(|| binary.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_success() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 0"]);
        run_with_timeout(&mut cmd, Duration::from_secs(5)).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_failure_captures_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo boom >&2; exit 3"]);
        let err = run_with_timeout(&mut cmd, Duration::from_secs(5)).unwrap_err();
        match err {
            TransportError::Tool { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_timeout_kills_child() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let start = Instant::now();
        let err = run_with_timeout(&mut cmd, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_binary_spawn_error() {
        let mut cmd = Command::new("hostpol-definitely-missing-tool");
        let err = run_with_timeout(&mut cmd, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_find_in_path() {
        assert!(find_in_path("sh").is_some());
        assert!(find_in_path("hostpol-definitely-missing-tool").is_none());
        assert!(find_in_path("/bin/sh").is_some());
    }
}
