//! Transport layer for hostpol
//!
//! Abstracts how policy, module and file content is fetched from a source.
//! Provides:
//! - `Transport` trait: the fetch contract every backend implements
//! - `TransportRegistry`: static name → factory table used to select a backend
//! - Backends: `local`, `http`, and the sync-tool variants `git`, `hg`,
//!   `svn`, `rsync`

pub mod backend;
mod command;
mod registry;
mod script;

use std::io;
use std::path::Path;
use std::time::Duration;

pub use backend::{HttpTransport, LocalTransport, SyncTool, SyncTransport};
pub use command::{find_in_path, run_with_timeout};
pub use registry::{infer_backend, TransportFactory, TransportRegistry};
pub use script::shell_quote;

/// Default bound on a single fetch or tool invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// The slice of client configuration a transport needs.
#[derive(Debug, Clone)]
pub struct TransportParams {
    /// Root location: filesystem path, URL, or repository address
    pub prefix: String,
    /// Optional credentials
    pub user: Option<String>,
    pub password: Option<String>,
    /// Extra arguments appended to delegated tool invocations
    pub extra_args: Vec<String>,
    /// Bound on each fetch / tool invocation
    pub timeout: Duration,
    /// Explicit proxy URL (http backend); environment proxies are used otherwise
    pub proxy: Option<String>,
}

impl TransportParams {
    /// Parameters with only a prefix set.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            user: None,
            password: None,
            extra_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
        }
    }
}

/// Transport errors
///
/// Any error from `fetch_contents` is the "no content" result: callers
/// distinguish it from `Ok` with an empty body.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown transport '{name}' (available: {available})")]
    Unknown { name: String, available: String },

    #[error("transport '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("invalid prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP request for {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("{tool} exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("{0} transport used before setup")]
    NotSetUp(&'static str),
}

/// Fetch capability implemented once per backend.
pub trait Transport {
    /// Stable identifier, also the registry key.
    fn name(&self) -> &'static str;

    /// Cheap local capability check. On failure the reason is kept and
    /// returned by [`Transport::error`].
    fn is_available(&mut self) -> bool;

    /// Reason recorded by the last failed [`Transport::is_available`] call.
    fn error(&self) -> Option<&str>;

    /// Idempotent one-time initialization inside the run workspace.
    fn setup(&mut self, _workspace: &Path) -> Result<(), TransportError> {
        Ok(())
    }

    /// Fetch `prefix + file` relative to the configured root.
    fn fetch_contents(&self, prefix: &str, file: &str) -> Result<Vec<u8>, TransportError>;

    /// Shell code that recreates this transport inside a generated script.
    ///
    /// Defines `fetch_file <name>` (reads `files/<name>`) and exits the
    /// script when the backend is unusable on the host.
    fn bootstrap_script(&self) -> String;

    /// Local mirror materialized by `setup`, if the backend keeps one.
    fn mirror(&self) -> Option<&Path> {
        None
    }
}
