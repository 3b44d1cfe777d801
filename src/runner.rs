//! Artifact execution
//!
//! The artifact is always run through an explicit interpreter call
//! (`<interpreter> <artifact>`), so it never needs to be executable.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Runner errors
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("cannot spawn {}: {source}", .interpreter.display())]
    Spawn {
        interpreter: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of one artifact execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
    pub duration: Duration,
}

/// Executes a built artifact.
pub trait Runner {
    fn run(&self, artifact: &Path) -> Result<RunReport, RunnerError>;
}

impl<R: Runner + ?Sized> Runner for &R {
    fn run(&self, artifact: &Path) -> Result<RunReport, RunnerError> {
        (**self).run(artifact)
    }
}

/// Runs the artifact with an external interpreter, inheriting stdio.
#[derive(Debug, Clone)]
pub struct InterpreterRunner {
    interpreter: PathBuf,
    envs: Vec<(OsString, OsString)>,
}

impl InterpreterRunner {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            envs: Vec::new(),
        }
    }

    /// Add an environment variable for the child.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }
}

impl Runner for InterpreterRunner {
    fn run(&self, artifact: &Path) -> Result<RunReport, RunnerError> {
        let start = Instant::now();
        tracing::info!(
            interpreter = %self.interpreter.display(),
            artifact = %artifact.display(),
            "executing artifact"
        );

        let status = Command::new(&self.interpreter)
            .arg(artifact)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .status()
            .map_err(|source| RunnerError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        Ok(RunReport {
            code: status.code(),
            success: status.success(),
            duration: start.elapsed(),
        })
    }
}
