//! In-memory test doubles
//!
//! `MockTransport` serves a fixed file tree and records every fetch;
//! `RecordingRunner` records executed artifacts without spawning anything.
//! Both are used by the integration tests and by library users exercising
//! the resolver without a real source.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hostpol_transport::{Transport, TransportError};

use crate::runner::{RunReport, Runner, RunnerError};

/// Transport backed by an in-memory map of `prefix + file` → content.
#[derive(Debug, Default)]
pub struct MockTransport {
    files: BTreeMap<String, Vec<u8>>,
    failures: BTreeSet<String>,
    unavailable: Option<String>,
    fetched: RefCell<Vec<String>>,
    setup_calls: RefCell<u32>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` at `path` (e.g. `policies/default`).
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), content.into());
        self
    }

    /// Fail fetches of `path` even if content exists.
    pub fn with_failure(mut self, path: &str) -> Self {
        self.failures.insert(path.to_string());
        self
    }

    /// Report unavailable with `reason`.
    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }

    /// Paths fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }

    pub fn setup_calls(&self) -> u32 {
        *self.setup_calls.borrow()
    }
}

impl MockTransport {
    fn record_setup(&self) {
        *self.setup_calls.borrow_mut() += 1;
    }

    fn serve(&self, prefix: &str, file: &str) -> Result<Vec<u8>, TransportError> {
        let path = format!("{}{}", prefix, file);
        self.fetched.borrow_mut().push(path.clone());

        if self.failures.contains(&path) {
            return Err(TransportError::Tool {
                tool: "mock".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("injected failure for {}", path),
            });
        }

        self.files.get(&path).cloned().ok_or_else(|| TransportError::Io {
            path,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        })
    }
}

const MOCK_BOOTSTRAP: &str = "fetch_file() {\n    echo \"mock:$1\"\n}\n";

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&mut self) -> bool {
        self.unavailable.is_none()
    }

    fn error(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    fn setup(&mut self, _workspace: &Path) -> Result<(), TransportError> {
        self.record_setup();
        Ok(())
    }

    fn fetch_contents(&self, prefix: &str, file: &str) -> Result<Vec<u8>, TransportError> {
        self.serve(prefix, file)
    }

    fn bootstrap_script(&self) -> String {
        MOCK_BOOTSTRAP.to_string()
    }
}

/// Lets a test keep the mock and inspect it after the controller is done.
impl Transport for &MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&mut self) -> bool {
        self.unavailable.is_none()
    }

    fn error(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    fn setup(&mut self, _workspace: &Path) -> Result<(), TransportError> {
        self.record_setup();
        Ok(())
    }

    fn fetch_contents(&self, prefix: &str, file: &str) -> Result<Vec<u8>, TransportError> {
        self.serve(prefix, file)
    }

    fn bootstrap_script(&self) -> String {
        MOCK_BOOTSTRAP.to_string()
    }
}

/// Runner that records artifacts instead of executing them.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    runs: RefCell<Vec<(PathBuf, String)>>,
    exit_code: i32,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code reported for every run.
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Artifact paths and their contents at execution time.
    pub fn runs(&self) -> Vec<(PathBuf, String)> {
        self.runs.borrow().clone()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, artifact: &Path) -> Result<RunReport, RunnerError> {
        let contents = std::fs::read_to_string(artifact).map_err(|source| RunnerError::Spawn {
            interpreter: PathBuf::from("recording"),
            source,
        })?;
        self.runs.borrow_mut().push((artifact.to_path_buf(), contents));

        Ok(RunReport {
            code: Some(self.exit_code),
            success: self.exit_code == 0,
            duration: Duration::ZERO,
        })
    }
}
