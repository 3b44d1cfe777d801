//! Direct filesystem reads.

use std::fs;
use std::path::{Path, PathBuf};

use crate::script::shell_quote;
use crate::{Transport, TransportError, TransportParams};

/// Reads content straight from a directory on the local filesystem.
#[derive(Debug)]
pub struct LocalTransport {
    params: TransportParams,
    error: Option<String>,
}

impl LocalTransport {
    pub fn new(params: TransportParams) -> Self {
        Self {
            params,
            error: None,
        }
    }

    /// Registry factory.
    pub fn boxed(params: TransportParams) -> Box<dyn Transport> {
        Box::new(Self::new(params))
    }

    /// Source root with any `file://` scheme removed.
    pub fn root(&self) -> PathBuf {
        let prefix = &self.params.prefix;
        PathBuf::from(prefix.strip_prefix("file://").unwrap_or(prefix))
    }

    fn resolve(&self, prefix: &str, file: &str) -> PathBuf {
        if Path::new(file).is_absolute() {
            PathBuf::from(file)
        } else {
            self.root().join(prefix).join(file)
        }
    }
}

impl Transport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_available(&mut self) -> bool {
        let root = self.root();
        if root.is_dir() {
            self.error = None;
            true
        } else {
            self.error = Some(format!("{} is not a directory", root.display()));
            false
        }
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn fetch_contents(&self, prefix: &str, file: &str) -> Result<Vec<u8>, TransportError> {
        let path = self.resolve(prefix, file);
        tracing::debug!(path = %path.display(), "local fetch");
        fs::read(&path).map_err(|source| TransportError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn bootstrap_script(&self) -> String {
        let root = self.root();
        format!(
            r#"HOSTPOL_SOURCE={root}
if [ ! -d "$HOSTPOL_SOURCE" ]; then
    echo "hostpol: local transport unavailable: $HOSTPOL_SOURCE is not a directory" >&2
    exit 1
fi
fetch_file() {{
    cat "$HOSTPOL_SOURCE/files/$1"
}}
"#,
            root = shell_quote(&root.to_string_lossy()),
        )
    }
}
