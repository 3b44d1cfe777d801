//! Backends that delegate to an external sync tool.
//!
//! `setup` materializes a mirror of the source under `<workspace>/mirror`
//! (clone/checkout the first time, update in place afterwards). Fetches are
//! then plain reads from the mirror.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::command::{find_in_path, run_with_timeout};
use crate::script::shell_quote;
use crate::{Transport, TransportError, TransportParams};

/// Directory name of the mirror inside the workspace.
const MIRROR_DIR: &str = "mirror";

/// Supported sync tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTool {
    Git,
    Hg,
    Svn,
    Rsync,
}

impl SyncTool {
    /// Backend identifier, also the default binary name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncTool::Git => "git",
            SyncTool::Hg => "hg",
            SyncTool::Svn => "svn",
            SyncTool::Rsync => "rsync",
        }
    }

    /// Source address as the tool expects it.
    ///
    /// `hg+<scheme>://` drops the marker; bare `hg://` is served over http.
    fn source(&self, prefix: &str) -> String {
        match self {
            SyncTool::Hg => match prefix.strip_prefix("hg://") {
                Some(rest) => format!("http://{}", rest),
                None => prefix.strip_prefix("hg+").unwrap_or(prefix).to_string(),
            },
            SyncTool::Rsync if !prefix.ends_with('/') => format!("{}/", prefix),
            _ => prefix.to_string(),
        }
    }

    /// Whether `user` / `password` are passed on the command line.
    pub fn accepts_credentials(&self) -> bool {
        *self == SyncTool::Svn
    }

    /// Arguments for the initial materialization into `dest`.
    fn checkout_args(&self, params: &TransportParams, dest: &Path) -> Vec<OsString> {
        let source = OsString::from(self.source(&params.prefix));
        let extra = params.extra_args.iter().map(OsString::from);
        let mut args: Vec<OsString> = match self {
            SyncTool::Git => vec!["clone".into(), "--quiet".into(), "--depth".into(), "1".into()],
            SyncTool::Hg => vec!["clone".into(), "--quiet".into()],
            SyncTool::Svn => {
                let mut args: Vec<OsString> =
                    vec!["checkout".into(), "--quiet".into(), "--non-interactive".into()];
                args.extend(svn_credentials(params));
                args
            }
            SyncTool::Rsync => vec!["-a".into(), "--delete".into()],
        };
        args.extend(extra);
        args.push(source);
        args.push(self.mirror_arg(dest));
        args
    }

    /// Arguments for refreshing an existing mirror at `dest`.
    fn update_args(&self, params: &TransportParams, dest: &Path) -> Vec<OsString> {
        let extra = params.extra_args.iter().map(OsString::from);
        let mut args: Vec<OsString> = match self {
            SyncTool::Git => vec![
                "-C".into(),
                dest.into(),
                "pull".into(),
                "--quiet".into(),
                "--ff-only".into(),
            ],
            SyncTool::Hg => vec![
                "pull".into(),
                "--update".into(),
                "--quiet".into(),
                "-R".into(),
                dest.into(),
            ],
            SyncTool::Svn => {
                let mut args: Vec<OsString> =
                    vec!["update".into(), "--quiet".into(), "--non-interactive".into()];
                args.extend(svn_credentials(params));
                args
            }
            // rsync is its own update
            SyncTool::Rsync => return self.checkout_args(params, dest),
        };
        args.extend(extra);
        if *self == SyncTool::Svn {
            args.push(dest.into());
        }
        args
    }

    fn mirror_arg(&self, dest: &Path) -> OsString {
        let mut arg = dest.as_os_str().to_os_string();
        if *self == SyncTool::Rsync {
            arg.push("/");
        }
        arg
    }
}

fn svn_credentials(params: &TransportParams) -> Vec<OsString> {
    let mut args = Vec::new();
    if let Some(ref user) = params.user {
        args.push("--username".into());
        args.push(user.into());
    }
    if let Some(ref password) = params.password {
        args.push("--password".into());
        args.push(password.into());
    }
    args
}

/// A transport backed by a local mirror kept current by a sync tool.
#[derive(Debug)]
pub struct SyncTransport {
    tool: SyncTool,
    binary: String,
    params: TransportParams,
    mirror: Option<PathBuf>,
    error: Option<String>,
}

impl SyncTransport {
    pub fn new(tool: SyncTool, params: TransportParams) -> Self {
        Self {
            tool,
            binary: tool.name().to_string(),
            params,
            mirror: None,
            error: None,
        }
    }

    /// Use a specific binary instead of looking up the tool by name.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn tool(&self) -> SyncTool {
        self.tool
    }

    /// Credentials are configured but the tool has no way to receive them.
    fn ignores_credentials(&self) -> bool {
        !self.tool.accepts_credentials() && (self.params.user.is_some() || self.params.password.is_some())
    }

    pub fn git(params: TransportParams) -> Box<dyn Transport> {
        Box::new(Self::new(SyncTool::Git, params))
    }

    pub fn hg(params: TransportParams) -> Box<dyn Transport> {
        Box::new(Self::new(SyncTool::Hg, params))
    }

    pub fn svn(params: TransportParams) -> Box<dyn Transport> {
        Box::new(Self::new(SyncTool::Svn, params))
    }

    pub fn rsync(params: TransportParams) -> Box<dyn Transport> {
        Box::new(Self::new(SyncTool::Rsync, params))
    }
}

impl Transport for SyncTransport {
    fn name(&self) -> &'static str {
        self.tool.name()
    }

    fn is_available(&mut self) -> bool {
        if find_in_path(&self.binary).is_some() {
            self.error = None;
            true
        } else {
            self.error = Some(format!("{} not found in PATH", self.binary));
            false
        }
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn setup(&mut self, workspace: &Path) -> Result<(), TransportError> {
        let dest = workspace.join(MIRROR_DIR);
        let args = if dest.exists() {
            self.tool.update_args(&self.params, &dest)
        } else {
            self.tool.checkout_args(&self.params, &dest)
        };

        if self.ignores_credentials() {
            tracing::debug!(
                tool = self.tool.name(),
                "user/password ignored; embed credentials in the prefix or use the tool's own config"
            );
        }
        tracing::info!(tool = self.tool.name(), mirror = %dest.display(), "materializing mirror");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args);
        run_with_timeout(&mut cmd, self.params.timeout)?;

        self.mirror = Some(dest);
        Ok(())
    }

    fn fetch_contents(&self, prefix: &str, file: &str) -> Result<Vec<u8>, TransportError> {
        let mirror = self
            .mirror
            .as_ref()
            .ok_or(TransportError::NotSetUp(self.tool.name()))?;
        let path = mirror.join(prefix).join(file);
        tracing::debug!(path = %path.display(), "mirror fetch");
        fs::read(&path).map_err(|source| TransportError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn bootstrap_script(&self) -> String {
        let mirror = self
            .mirror
            .as_ref()
            .map(|m| m.to_string_lossy().to_string())
            .unwrap_or_default();
        format!(
            r#"HOSTPOL_MIRROR={mirror}
if ! command -v {binary} >/dev/null 2>&1 || [ ! -d "$HOSTPOL_MIRROR" ]; then
    echo "hostpol: {name} transport unavailable: mirror '$HOSTPOL_MIRROR' missing or {binary} not installed" >&2
    exit 1
fi
fetch_file() {{
    cat "$HOSTPOL_MIRROR/files/$1"
}}
"#,
            mirror = shell_quote(&mirror),
            binary = shell_quote(&self.binary),
            name = self.tool.name(),
        )
    }

    fn mirror(&self) -> Option<&Path> {
        self.mirror.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn test_git_checkout_args() {
        let mut params = TransportParams::new("https://example.com/pol.git");
        params.extra_args = vec!["--branch".into(), "prod".into()];
        let args = strings(SyncTool::Git.checkout_args(&params, Path::new("/ws/mirror")));
        assert_eq!(
            args,
            vec![
                "clone",
                "--quiet",
                "--depth",
                "1",
                "--branch",
                "prod",
                "https://example.com/pol.git",
                "/ws/mirror"
            ]
        );
    }

    #[test]
    fn test_git_update_args() {
        let params = TransportParams::new("https://example.com/pol.git");
        let args = strings(SyncTool::Git.update_args(&params, Path::new("/ws/mirror")));
        assert_eq!(args, vec!["-C", "/ws/mirror", "pull", "--quiet", "--ff-only"]);
    }

    #[test]
    fn test_svn_passes_credentials() {
        let mut params = TransportParams::new("svn://example.com/pol");
        params.user = Some("alice".into());
        params.password = Some("pw".into());
        let args = strings(SyncTool::Svn.checkout_args(&params, Path::new("/ws/mirror")));
        assert!(args.windows(2).any(|w| w == ["--username", "alice"]));
        assert!(args.windows(2).any(|w| w == ["--password", "pw"]));
        assert_eq!(args.last().unwrap(), "/ws/mirror");
    }

    #[test]
    fn test_only_svn_takes_credentials() {
        let mut params = TransportParams::new("https://example.com/pol.git");
        params.user = Some("alice".into());

        let git = SyncTransport::new(SyncTool::Git, params.clone());
        assert!(git.ignores_credentials());
        let args = strings(SyncTool::Git.checkout_args(&params, Path::new("/ws/mirror")));
        assert!(!args.iter().any(|a| a == "alice"));

        let svn = SyncTransport::new(SyncTool::Svn, params.clone());
        assert!(!svn.ignores_credentials());

        let anonymous = SyncTransport::new(SyncTool::Hg, TransportParams::new("hg://example.com/pol"));
        assert!(!anonymous.ignores_credentials());
    }

    #[test]
    fn test_svn_update_targets_mirror() {
        let params = TransportParams::new("svn://example.com/pol");
        let args = strings(SyncTool::Svn.update_args(&params, Path::new("/ws/mirror")));
        assert_eq!(args.first().unwrap(), "update");
        assert_eq!(args.last().unwrap(), "/ws/mirror");
    }

    #[test]
    fn test_rsync_trailing_slashes() {
        let params = TransportParams::new("rsync://example.com/pol");
        let args = strings(SyncTool::Rsync.checkout_args(&params, Path::new("/ws/mirror")));
        assert_eq!(args, vec!["-a", "--delete", "rsync://example.com/pol/", "/ws/mirror/"]);
        assert_eq!(
            strings(SyncTool::Rsync.update_args(&params, Path::new("/ws/mirror"))),
            args
        );
    }

    #[test]
    fn test_hg_scheme_prefix_stripped() {
        let params = TransportParams::new("hg+ssh://example.com/pol");
        let args = strings(SyncTool::Hg.checkout_args(&params, Path::new("/ws/mirror")));
        assert!(args.contains(&"ssh://example.com/pol".to_string()));
    }

    #[test]
    fn test_hg_scheme_served_over_http() {
        let params = TransportParams::new("hg://example.com/pol");
        let args = strings(SyncTool::Hg.checkout_args(&params, Path::new("/ws/mirror")));
        assert_eq!(args, vec!["clone", "--quiet", "http://example.com/pol", "/ws/mirror"]);
    }

    #[test]
    fn test_missing_binary_unavailable() {
        let mut transport = SyncTransport::new(SyncTool::Git, TransportParams::new("x.git"))
            .with_binary("hostpol-no-such-git");
        assert!(!transport.is_available());
        assert!(transport.error().unwrap().contains("hostpol-no-such-git"));
    }

    #[test]
    fn test_fetch_before_setup_fails() {
        let transport = SyncTransport::new(SyncTool::Rsync, TransportParams::new("/src"));
        let err = transport.fetch_contents("policies/", "default").unwrap_err();
        assert!(matches!(err, TransportError::NotSetUp("rsync")));
    }

    #[test]
    #[cfg(unix)]
    fn test_setup_with_stand_in_tool_reads_mirror() {
        use std::os::unix::fs::PermissionsExt;

        // a stand-in "rsync" that copies the source directory into the mirror
        let tools = tempfile::TempDir::new().unwrap();
        let fake = tools.path().join("fake-rsync");
        fs::write(
            &fake,
            "#!/bin/sh\nfor last; do :; done\neval src=\\${$(($#-1))}\nmkdir -p \"$last\" && cp -R \"$src\". \"$last\"\n",
        )
        .unwrap();
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();

        let source = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("policies")).unwrap();
        fs::write(source.path().join("policies/default"), "echo mirrored\n").unwrap();

        let workspace = tempfile::TempDir::new().unwrap();
        let mut transport = SyncTransport::new(
            SyncTool::Rsync,
            TransportParams::new(source.path().to_string_lossy()),
        )
        .with_binary(fake.to_string_lossy());

        assert!(transport.is_available());
        transport.setup(workspace.path()).unwrap();
        // second setup takes the update path and must also succeed
        transport.setup(workspace.path()).unwrap();

        assert_eq!(transport.mirror(), Some(workspace.path().join("mirror").as_path()));
        let body = transport.fetch_contents("policies/", "default").unwrap();
        assert_eq!(body, b"echo mirrored\n");
    }
}
