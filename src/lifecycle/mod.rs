//! Run lifecycle
//!
//! The top-level control flow of one invocation:
//! lock → workspace → privilege check → transport selection → splay →
//! transport setup → resolve → build → execute → cleanup.
//!
//! Guards are plain locals so they release in reverse order on every exit
//! path: the artifact first, then the workspace, then the lock.

mod lock;
mod privilege;
mod splay;
mod workspace;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hostpol_transport::{infer_backend, Transport, TransportParams, TransportRegistry};
use serde::Serialize;

use crate::artifact::{read_include, ArtifactBuilder};
use crate::config::{keys, Config, ConfigSnapshot, DEFAULT_LOCKFILE};
use crate::error::ClientError;
use crate::resolver::{PolicyResolver, ResolvedArtifact};
use crate::runner::{InterpreterRunner, RunReport, Runner};
use crate::signal::SignalState;

pub use lock::{HostLock, LockError, LockResult};
pub use privilege::{EffectiveUid, FixedPrivilege, PrivilegeCheck};
pub use splay::{splay_duration, NoSleep, SignalSleeper, SleepOutcome, Sleeper, POLL_INTERVAL};
pub use workspace::{Workspace, WORKSPACE_PREFIX};

/// File name of the artifact inside the workspace.
pub const ARTIFACT_NAME: &str = "policy.sh";

/// How a run ended without error
#[derive(Debug)]
pub enum RunOutcome {
    /// `dump` was set; holds the rendered config
    Dumped(String),
    /// The entry policy could not be fetched
    NoPolicy,
    /// Artifact built but not executed (`no_execute`). Unless `kept`, the
    /// workspace holding `artifact` is gone by the time the caller sees it.
    Built {
        artifact: PathBuf,
        sha256: String,
        kept: bool,
    },
    /// Artifact executed; its exit status is informational
    Executed { artifact: PathBuf, report: RunReport },
}

/// Data written by `emit_resolved`
#[derive(Debug, Serialize)]
struct ResolvedReport<'a> {
    run_id: &'a str,
    generated_at: DateTime<Utc>,
    transport: &'a str,
    resolved: &'a ResolvedArtifact,
    config: ConfigSnapshot<'a>,
}

/// Drives one run from a built `Config`.
pub struct Controller<'a> {
    config: Config,
    registry: TransportRegistry,
    signals: Arc<SignalState>,
    privilege: Box<dyn PrivilegeCheck + 'a>,
    transport: Option<Box<dyn Transport + 'a>>,
    runner: Option<Box<dyn Runner + 'a>>,
    sleeper: Option<Box<dyn Sleeper + 'a>>,
    workspace_parent: Option<PathBuf>,
    dump_json: bool,
}

impl<'a> Controller<'a> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: TransportRegistry::with_builtin(),
            signals: Arc::new(SignalState::new()),
            privilege: Box::new(EffectiveUid),
            transport: None,
            runner: None,
            sleeper: None,
            workspace_parent: None,
            dump_json: false,
        }
    }

    pub fn with_registry(mut self, registry: TransportRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Signal state polled during the splay.
    pub fn with_signals(mut self, signals: Arc<SignalState>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_privilege(mut self, privilege: impl PrivilegeCheck + 'a) -> Self {
        self.privilege = Box::new(privilege);
        self
    }

    /// Use `transport` instead of selecting one from the registry.
    pub fn with_transport(mut self, transport: impl Transport + 'a) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Use `runner` instead of the configured interpreter.
    pub fn with_runner(mut self, runner: impl Runner + 'a) -> Self {
        self.runner = Some(Box::new(runner));
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'a) -> Self {
        self.sleeper = Some(Box::new(sleeper));
        self
    }

    /// Create workspaces under `parent` instead of the system temp dir.
    pub fn with_workspace_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.workspace_parent = Some(parent.into());
        self
    }

    /// Render `dump` output as JSON.
    pub fn dump_json(mut self, json: bool) -> Self {
        self.dump_json = json;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the run.
    pub fn run(mut self) -> Result<RunOutcome, ClientError> {
        if self.config.get_bool(keys::DUMP) {
            let text = if self.dump_json {
                self.config.to_json().map_err(std::io::Error::from)?
            } else {
                self.config.dump()
            };
            return Ok(RunOutcome::Dumped(text));
        }

        let lock_path = PathBuf::from(
            self.config
                .get_non_empty(keys::LOCKFILE)
                .unwrap_or(DEFAULT_LOCKFILE),
        );
        let _lock = HostLock::acquire(&lock_path)?;

        let no_delete = self.config.get_bool(keys::NO_DELETE);
        let workspace = match self.workspace_parent {
            Some(ref parent) => Workspace::create_in(parent, no_delete),
            None => Workspace::create(no_delete),
        }
        .map_err(ClientError::Workspace)?;

        let uid = self.privilege.effective_uid();
        if uid != 0 {
            return Err(ClientError::Privilege { uid });
        }

        let mut transport = self.select_transport()?;
        if !transport.is_available() {
            return Err(ClientError::TransportUnavailable(format!(
                "{}: {}",
                transport.name(),
                transport.error().unwrap_or("not available")
            )));
        }
        tracing::info!(transport = transport.name(), "transport selected");

        self.splay()?;

        transport
            .setup(workspace.path())
            .map_err(|e| ClientError::TransportUnavailable(e.to_string()))?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let mut config = self
            .config
            .clone()
            .with_runtime(keys::WORKSPACE, workspace.path().display().to_string())
            .with_runtime(keys::RUN_ID, &run_id)
            .with_runtime(keys::TRANSPORT, transport.name());
        if let Some(mirror) = transport.mirror() {
            config = config.with_runtime(keys::MIRROR, mirror.display().to_string());
        }

        let resolved = match PolicyResolver::new(transport.as_ref(), &config).resolve()? {
            Some(resolved) => resolved,
            None => {
                let policy = config.get_non_empty(keys::POLICY).unwrap_or_default();
                eprintln!("hostpol: no policy '{}' available, nothing to do", policy);
                return Ok(RunOutcome::NoPolicy);
            }
        };

        let failed = resolved.failed_directives().count();
        tracing::info!(
            %run_id,
            directives = resolved.directives.len(),
            failed,
            "policy resolved"
        );

        if let Some(path) = config.get_non_empty(keys::EMIT_RESOLVED) {
            emit_resolved(Path::new(path), &run_id, transport.name(), &resolved, &config)?;
        }

        let mut builder = ArtifactBuilder::new(&config, transport.as_ref());
        if let Some(include) = config.get_non_empty(keys::INCLUDE) {
            builder = builder.with_include(read_include(Path::new(include))?);
        }
        let artifact = builder.build(&resolved);

        let artifact_path = workspace.join(ARTIFACT_NAME);
        artifact.write_to(&artifact_path)?;
        tracing::info!(path = %artifact_path.display(), sha256 = artifact.sha256(), "artifact built");

        if config.get_bool(keys::NO_EXECUTE) {
            return Ok(RunOutcome::Built {
                artifact: artifact_path,
                sha256: artifact.sha256().to_string(),
                kept: no_delete,
            });
        }

        let report = match self.runner.take() {
            Some(runner) => runner.run(&artifact_path),
            None => default_runner(&config, &run_id, workspace.path()).run(&artifact_path),
        };

        if !no_delete {
            if let Err(e) = fs::remove_file(&artifact_path) {
                tracing::warn!(path = %artifact_path.display(), error = %e, "cannot remove artifact");
            }
        }

        let report = report?;
        match report.code {
            Some(0) => tracing::info!(duration = ?report.duration, "policy completed"),
            Some(code) => tracing::warn!(code, duration = ?report.duration, "policy exited non-zero"),
            None => tracing::warn!(duration = ?report.duration, "policy terminated by signal"),
        }

        Ok(RunOutcome::Executed {
            artifact: artifact_path,
            report,
        })
    }

    fn select_transport(&mut self) -> Result<Box<dyn Transport + 'a>, ClientError> {
        if let Some(transport) = self.transport.take() {
            return Ok(transport);
        }

        let params = transport_params(&self.config)?;
        let name = match self.config.get_non_empty(keys::TRANSPORT) {
            Some(name) => name.to_string(),
            None => {
                let inferred = infer_backend(&params.prefix);
                tracing::debug!(prefix = %params.prefix, backend = inferred, "inferred transport");
                inferred.to_string()
            }
        };

        self.registry
            .create(&name, params)
            .map_err(|e| ClientError::TransportUnavailable(e.to_string()))
    }

    fn splay(&self) -> Result<(), ClientError> {
        let max_delay = self.config.get_i64(keys::MAX_DELAY)?.unwrap_or(0);
        let delay = splay_duration(max_delay, &mut rand::thread_rng());
        if delay.is_zero() {
            return Ok(());
        }

        tracing::info!(delay = ?delay, max_delay, "splay");
        let outcome = match self.sleeper {
            Some(ref sleeper) => sleeper.sleep(delay),
            None => SignalSleeper::new(&self.signals).sleep(delay),
        };

        match outcome {
            SleepOutcome::Completed => Ok(()),
            SleepOutcome::Interrupted => Err(ClientError::Cancelled),
        }
    }
}

/// Transport parameters from config. A prefix is required.
pub fn transport_params(config: &Config) -> Result<TransportParams, ClientError> {
    let prefix = config
        .get_non_empty(keys::PREFIX)
        .ok_or_else(|| ClientError::TransportUnavailable("no prefix configured".to_string()))?;

    let mut params = TransportParams::new(prefix.trim());
    params.user = config.get_non_empty(keys::USER).map(str::to_string);
    params.password = config.get(keys::PASSWORD).map(str::to_string);
    params.proxy = config.get_non_empty(keys::PROXY).map(str::to_string);
    params.extra_args = config
        .get(keys::TRANSPORT_ARGS)
        .map(|args| args.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if let Some(secs) = config.get_u64(keys::FETCH_TIMEOUT)? {
        params.timeout = Duration::from_secs(secs.max(1));
    }

    Ok(params)
}

fn default_runner(config: &Config, run_id: &str, workspace: &Path) -> InterpreterRunner {
    let interpreter = config.get_non_empty(keys::INTERPRETER).unwrap_or("/bin/sh");
    InterpreterRunner::new(interpreter)
        .env("HOSTPOL_RUN_ID", run_id)
        .env("HOSTPOL_WORKSPACE", workspace.as_os_str())
}

fn emit_resolved(
    path: &Path,
    run_id: &str,
    transport: &str,
    resolved: &ResolvedArtifact,
    config: &Config,
) -> Result<(), ClientError> {
    let report = ResolvedReport {
        run_id,
        generated_at: Utc::now(),
        transport,
        resolved,
        config: config.snapshot(),
    };
    let json = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;

    fs::write(path, json).map_err(|source| ClientError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "resolved policy written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLayer, ConfigOrigin};

    fn config(pairs: &[(&str, &str)]) -> Config {
        let mut layer = ConfigLayer::new(ConfigOrigin::Cli);
        for (k, v) in pairs {
            layer.set(*k, *v);
        }
        Config::from_layers(vec![layer])
    }

    #[test]
    fn test_transport_params() {
        let config = config(&[
            (keys::PREFIX, " https://example.com/pol/ "),
            (keys::USER, "alice"),
            (keys::PASSWORD, "pw"),
            (keys::TRANSPORT_ARGS, "--depth 1  --quiet"),
            (keys::FETCH_TIMEOUT, "30"),
        ]);
        let params = transport_params(&config).unwrap();
        assert_eq!(params.prefix, "https://example.com/pol/");
        assert_eq!(params.user.as_deref(), Some("alice"));
        assert_eq!(params.password.as_deref(), Some("pw"));
        assert_eq!(params.extra_args, vec!["--depth", "1", "--quiet"]);
        assert_eq!(params.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_prefix_is_transport_unavailable() {
        let err = transport_params(&config(&[])).unwrap_err();
        assert_eq!(err.exit_code(), 20);
    }

    #[test]
    fn test_bad_timeout_is_config_error() {
        let err = transport_params(&config(&[(keys::PREFIX, "/srv"), (keys::FETCH_TIMEOUT, "soon")]))
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_dump_short_circuits() {
        let outcome = Controller::new(config(&[(keys::DUMP, "1"), (keys::PASSWORD, "hunter2")]))
            .run()
            .unwrap();
        match outcome {
            RunOutcome::Dumped(text) => {
                assert!(text.contains("password"));
                assert!(!text.contains("hunter2"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
