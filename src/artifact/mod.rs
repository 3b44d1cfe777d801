//! Artifact building
//!
//! Renders a resolved policy, its module bundle and the run's config into a
//! single self-contained `sh` script. Sections always appear in this order:
//!
//! 1. config declarations
//! 2. `config_get` / `config_keys`
//! 3. transport bootstrap (`fetch_file`)
//! 4. log buffer (`log_msg` and friends)
//! 5. privilege check
//! 6. `policy_main` wrapping the resolved policy
//! 7. `flush_logs`
//! 8. include file
//! 9. modules, then the entry point

pub mod render;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hostpol_transport::Transport;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{keys, Config};
use crate::resolver::ResolvedArtifact;

/// Section names, in render order.
pub const SECTIONS: [&str; 9] = [
    "config",
    "config lookup",
    "transport",
    "log buffer",
    "privilege check",
    "policy",
    "log flush",
    "include",
    "modules",
];

/// Artifact errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read include file {}: {source}", .path.display())]
    Include {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Rendered script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    text: String,
    sha256: String,
}

impl Artifact {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// SHA-256 of the full script text.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Write to a new file at `path` with mode `0600`.
    ///
    /// Fails if the file already exists. The mode is set at creation, before
    /// any content is written.
    pub fn write_to(&self, path: &Path) -> Result<(), ArtifactError> {
        let write_err = |source: io::Error| ArtifactError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut file = create_private(path).map_err(write_err)?;
        file.write_all(self.text.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        tracing::debug!(path = %path.display(), sha256 = %self.sha256, "artifact written");
        Ok(())
    }
}

#[cfg(unix)]
fn create_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Read an include file verbatim.
pub fn read_include(path: &Path) -> Result<String, ArtifactError> {
    fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| ArtifactError::Include {
            path: path.to_path_buf(),
            source,
        })
}

/// Builds an `Artifact` for one run.
pub struct ArtifactBuilder<'a> {
    config: &'a Config,
    bootstrap: String,
    include: Option<String>,
    generated_at: DateTime<Utc>,
}

impl<'a> ArtifactBuilder<'a> {
    pub fn new(config: &'a Config, transport: &dyn Transport) -> Self {
        Self {
            config,
            bootstrap: transport.bootstrap_script(),
            include: None,
            generated_at: Utc::now(),
        }
    }

    /// Raw text inserted after the log flush definition.
    pub fn with_include(mut self, text: impl Into<String>) -> Self {
        self.include = Some(text.into());
        self
    }

    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = at;
        self
    }

    pub fn build(&self, resolved: &ResolvedArtifact) -> Artifact {
        let mut text = self.header(resolved);

        let bodies = [
            render::declarations(self.config),
            render::lookup(self.config),
            self.bootstrap.clone(),
            render::log_buffer(self.config),
            render::privilege_check(),
            render::policy_body(&resolved.policy_text),
            render::log_flush(),
            self.include.clone().unwrap_or_default(),
            resolved.module_text.clone(),
        ];

        for (name, body) in SECTIONS.iter().zip(bodies) {
            text.push('\n');
            text.push_str(&render::section(name));
            text.push_str(&body);
            if !body.is_empty() && !body.ends_with('\n') {
                text.push('\n');
            }
        }

        text.push('\n');
        text.push_str(&render::section("entry point"));
        text.push_str(&render::entry_point());

        let sha256 = hex::encode(Sha256::digest(text.as_bytes()));
        Artifact { text, sha256 }
    }

    fn header(&self, resolved: &ResolvedArtifact) -> String {
        let policy_digest = hex::encode(Sha256::digest(resolved.policy_text.as_bytes()));
        let run_id = self.config.get(keys::RUN_ID).unwrap_or("-");

        format!(
            "#!/bin/sh\n\
             # generated by hostpol {}\n\
             # run: {}\n\
             # generated: {}\n\
             # policy: {} sha256:{}\n",
            env!("CARGO_PKG_VERSION"),
            single_line(run_id),
            self.generated_at.to_rfc3339(),
            single_line(&resolved.policy),
            policy_digest,
        )
    }
}

fn single_line(s: &str) -> String {
    s.replace(['\n', '\r'], " ")
}
