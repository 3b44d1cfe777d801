//! hostpol - host-side policy distribution client
//!
//! Fetches a named policy and its modules from a source over a pluggable
//! transport, resolves `FetchPolicy` / `FetchModule` directives, renders the
//! result into a self-contained `sh` artifact bound to the host's config, and
//! runs it once under a host-wide lock.

pub mod artifact;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod resolver;
pub mod runner;
pub mod signal;

pub use artifact::{Artifact, ArtifactBuilder, ArtifactError};
pub use config::{Config, ConfigError, ConfigLayer, ConfigOrigin, ConfigSources};
pub use discovery::HostFacts;
pub use error::ClientError;
pub use lifecycle::{Controller, HostLock, LockError, RunOutcome, Workspace};
pub use resolver::{PolicyResolver, ResolveError, ResolvedArtifact};
pub use runner::{InterpreterRunner, RunReport, Runner, RunnerError};
pub use signal::{SignalHandler, SignalState};

pub use hostpol_directive as directive;
pub use hostpol_transport as transport;
