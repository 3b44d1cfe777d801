//! Static backend registry.
//!
//! Backends are selected by name at runtime. The registry is a plain table
//! built at startup; an unknown name is an ordinary error.

use std::collections::BTreeMap;

use crate::backend::{HttpTransport, LocalTransport, SyncTransport};
use crate::{Transport, TransportError, TransportParams};

/// Constructs a backend from its parameters.
pub type TransportFactory = fn(TransportParams) -> Box<dyn Transport>;

/// Alternative spellings accepted for backend names.
const ALIASES: &[(&str, &str)] = &[
    ("https", "http"),
    ("file", "local"),
    ("mercurial", "hg"),
    ("subversion", "svn"),
];

/// Name → factory table.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: BTreeMap<&'static str, TransportFactory>,
}

impl TransportRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("local", LocalTransport::boxed);
        registry.register("http", HttpTransport::boxed);
        registry.register("git", SyncTransport::git);
        registry.register("hg", SyncTransport::hg);
        registry.register("svn", SyncTransport::svn);
        registry.register("rsync", SyncTransport::rsync);
        registry
    }

    /// Add or replace a backend.
    pub fn register(&mut self, name: &'static str, factory: TransportFactory) {
        self.factories.insert(name, factory);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(canonical(name).as_str())
    }

    /// Instantiate the backend registered under `name`.
    pub fn create(
        &self,
        name: &str,
        params: TransportParams,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let key = canonical(name);
        let factory = self
            .factories
            .get(key.as_str())
            .ok_or_else(|| TransportError::Unknown {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        Ok(factory(params))
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

fn canonical(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, target)| target.to_string())
        .unwrap_or(lower)
}

/// Pick a backend from the shape of a prefix.
///
/// Recognized VCS schemes and suffixes map to their tool, filesystem paths
/// to `local`, everything else to `http`.
pub fn infer_backend(prefix: &str) -> &'static str {
    let prefix = prefix.trim();
    let bare = prefix.trim_end_matches('/');

    if prefix.starts_with("git://")
        || prefix.starts_with("git+ssh://")
        || prefix.starts_with("git@")
        || bare.ends_with(".git")
    {
        return "git";
    }

    if prefix.starts_with("svn://") || prefix.starts_with("svn+ssh://") {
        return "svn";
    }

    if prefix.starts_with("hg://")
        || prefix.starts_with("hg+")
        || prefix.starts_with("static-http://")
        || bare.ends_with(".hg")
    {
        return "hg";
    }

    if prefix.starts_with("rsync://") || is_rsync_daemon_path(prefix) {
        return "rsync";
    }

    if prefix.starts_with("file://") || prefix.starts_with('/') {
        return "local";
    }

    "http"
}

/// `host::module[/path]` syntax.
fn is_rsync_daemon_path(prefix: &str) -> bool {
    match prefix.split_once("::") {
        Some((host, _)) => !host.is_empty() && !host.contains('/'),
        None => false,
    }
}
