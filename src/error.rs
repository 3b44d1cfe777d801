//! Top-level client error and exit codes

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::config::ConfigError;
use crate::lifecycle::LockError;
use crate::resolver::ResolveError;
use crate::runner::RunnerError;
use crate::signal::EXIT_CODE_CANCELLED;

/// Errors that end a run
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    LockContention(String),

    #[error("lock error: {0}")]
    Lock(LockError),

    #[error("must run as root (effective uid {uid})")]
    Privilege { uid: u32 },

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("fetch failed: {0}")]
    FetchFailure(String),

    #[error("cannot write artifact: {0}")]
    ArtifactWrite(#[from] ArtifactError),

    #[error("cannot create workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error("cannot run artifact: {0}")]
    Runner(#[from] RunnerError),

    #[error("cancelled")]
    Cancelled,

    #[error("cannot write {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<LockError> for ClientError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Contention(_) => ClientError::LockContention(err.to_string()),
            other => ClientError::Lock(other),
        }
    }
}

impl From<ResolveError> for ClientError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Fetch { .. } => ClientError::FetchFailure(err.to_string()),
        }
    }
}

impl ClientError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Config(_) => 1,
            ClientError::LockContention(_) => 10,
            ClientError::Lock(_) => 10,
            ClientError::Privilege { .. } => 11,
            ClientError::TransportUnavailable(_) => 20,
            ClientError::FetchFailure(_) => 30,
            ClientError::ArtifactWrite(_) => 40,
            ClientError::Workspace(_) => 41,
            ClientError::Runner(_) => 50,
            ClientError::Cancelled => EXIT_CODE_CANCELLED,
            ClientError::Output { .. } => 1,
            ClientError::Io(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ClientError::Cancelled.exit_code(), 80);
        assert_eq!(ClientError::Privilege { uid: 1000 }.exit_code(), 11);
        assert_eq!(ClientError::TransportUnavailable("x".into()).exit_code(), 20);
        assert_eq!(ClientError::FetchFailure("x".into()).exit_code(), 30);
        assert_eq!(
            ClientError::Workspace(io::Error::new(io::ErrorKind::Other, "x")).exit_code(),
            41
        );
    }

    #[test]
    fn test_lock_contention_mapping() {
        let err: ClientError = LockError::Contention(PathBuf::from("/var/lock/hostpol.lock")).into();
        assert!(matches!(err, ClientError::LockContention(_)));
        assert_eq!(err.exit_code(), 10);
        assert!(err.to_string().contains("/var/lock/hostpol.lock"));

        let err: ClientError = LockError::Io {
            path: PathBuf::from("/x"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert!(matches!(err, ClientError::Lock(_)));
    }
}
