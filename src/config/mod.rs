//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Host environment discovery
//! 3. Config file (/etc/hostpol.conf or --config)
//! 4. CLI flags

mod defaults;
mod effective;
mod file;
mod merge;

use std::path::{Path, PathBuf};

pub use defaults::{keys, BuiltinDefaults, DEFAULT_CONFIG_FILE, DEFAULT_LOCKFILE, DEFAULT_POLICY};
pub use effective::{Config, ConfigError, ConfigSnapshot, SnapshotEntry, REDACTED};
pub use file::{parse_key_values, parse_toml, ConfigFile};
pub use merge::{merge_layers, ConfigLayer, ConfigOrigin, ConfigValue};

/// Inputs to a config build
#[derive(Debug, Clone)]
pub struct ConfigSources {
    pub defaults: BuiltinDefaults,
    pub discovery: Option<ConfigLayer>,
    /// Config file read when the CLI names none; skipped if absent
    pub default_file: Option<PathBuf>,
    pub cli: ConfigLayer,
}

impl ConfigSources {
    pub fn new(cli: ConfigLayer) -> Self {
        Self {
            defaults: BuiltinDefaults::default(),
            discovery: None,
            default_file: Some(PathBuf::from(DEFAULT_CONFIG_FILE)),
            cli,
        }
    }

    pub fn with_discovery(mut self, layer: ConfigLayer) -> Self {
        self.discovery = Some(layer);
        self
    }

    pub fn with_default_file(mut self, path: Option<PathBuf>) -> Self {
        self.default_file = path;
        self
    }

    /// Merge every layer into a `Config`.
    ///
    /// A config file named on the command line must exist; the default one
    /// is optional.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut layers = vec![self.defaults.to_layer()];

        if let Some(discovery) = self.discovery {
            layers.push(discovery);
        }

        let explicit = self.cli.get(keys::CONFIG).flatten().map(PathBuf::from);
        let file = match (explicit, self.default_file) {
            (Some(path), _) => Some(ConfigFile::load(&path)?),
            (None, Some(path)) => load_optional(&path)?,
            (None, None) => None,
        };

        if let Some(file) = file {
            tracing::info!(path = %file.path, digest = %file.digest, "using config file");
            // the file in use is decided before it is read
            layers.push(without_key(file.layer, keys::CONFIG));
        }

        layers.push(self.cli);

        Ok(Config::from_layers(layers))
    }
}

fn load_optional(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    match ConfigFile::load(path) {
        Ok(file) => Ok(Some(file)),
        Err(ConfigError::NotFound { path }) => {
            tracing::debug!(%path, "no config file");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn without_key(layer: ConfigLayer, key: &str) -> ConfigLayer {
    let mut out = ConfigLayer::new(layer.origin());
    for (k, v) in layer.into_entries() {
        if k == key {
            continue;
        }
        match v {
            Some(v) => out.set(k, v),
            None => out.declare(k),
        }
    }
    out
}

/// Split a `key=value` definition.
pub fn parse_define(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::InvalidDefine(raw.to_string())),
    }
}
