//! Per-run private workspace
//!
//! An owner-only (`0700`) temporary directory removed on drop unless the run
//! asked to keep it.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Prefix of workspace directory names.
pub const WORKSPACE_PREFIX: &str = "hostpol-";

/// Scoped run directory
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    keep: bool,
}

impl Workspace {
    /// Create a workspace under the system temp dir.
    pub fn create(keep: bool) -> io::Result<Self> {
        Self::create_in(&std::env::temp_dir(), keep)
    }

    /// Create a workspace under `parent`.
    pub fn create_in(parent: &Path, keep: bool) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .disable_cleanup(keep)
            .tempdir_in(parent)?;
        restrict(dir.path())?;

        tracing::debug!(path = %dir.path().display(), keep, "workspace created");
        Ok(Self { dir, keep })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the workspace.
    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn keeps(&self) -> bool {
        self.keep
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            tracing::info!(path = %self.dir.path().display(), "workspace kept");
        } else {
            tracing::debug!(path = %self.dir.path().display(), "workspace removed");
        }
    }
}

#[cfg(unix)]
fn restrict(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_removed_on_drop() {
        let parent = TempDir::new().unwrap();
        let path = {
            let ws = Workspace::create_in(parent.path(), false).unwrap();
            std::fs::write(ws.join("policy.sh"), "true\n").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_when_requested() {
        let parent = TempDir::new().unwrap();
        let path = {
            let ws = Workspace::create_in(parent.path(), true).unwrap();
            assert!(ws.keeps());
            ws.path().to_path_buf()
        };
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORKSPACE_PREFIX));
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;

        let parent = TempDir::new().unwrap();
        let ws = Workspace::create_in(parent.path(), false).unwrap();
        let mode = std::fs::metadata(ws.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
