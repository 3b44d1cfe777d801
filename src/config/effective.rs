//! Effective configuration with provenance
//!
//! `Config` is the merged, read-only key/value view handed to every stage.
//! Each value remembers which layer it came from for `--dump`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use super::merge::{merge_layers, ConfigLayer, ConfigOrigin, ConfigValue};

/// Keys whose values are never printed.
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "credential"];

/// Placeholder printed instead of a secret value.
pub const REDACTED: &str = "[REDACTED]";

/// Merged configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    entries: BTreeMap<String, ConfigValue>,
}

/// Redacted, serializable view of a `Config`
#[derive(Debug, Serialize)]
pub struct ConfigSnapshot<'a> {
    pub entries: BTreeMap<&'a str, SnapshotEntry<'a>>,
    pub redactions: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotEntry<'a> {
    pub value: Option<&'a str>,
    pub origin: ConfigOrigin,
}

impl Config {
    /// Merge `layers`, lowest precedence first.
    pub fn from_layers(layers: Vec<ConfigLayer>) -> Self {
        Self {
            entries: merge_layers(layers),
        }
    }

    /// The value of `key`, `None` when absent or unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.value.as_deref())
    }

    /// The value of `key` if set to a non-empty string.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// Whether `key` exists at all, set or not.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn origin(&self, key: &str) -> Option<ConfigOrigin> {
        self.entries.get(key).map(|v| v.origin)
    }

    /// `1`, `true`, `yes` and `on` (any case) are true; everything else,
    /// including absent keys, is false.
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "on")
        )
    }

    /// Parse `key` as a signed integer. `Ok(None)` when unset.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.parse_with(key, |v| v.parse::<i64>().ok())
    }

    /// Parse `key` as an unsigned integer. `Ok(None)` when unset.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.parse_with(key, |v| v.parse::<u64>().ok())
    }

    fn parse_with<T>(
        &self,
        key: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Result<Option<T>, ConfigError> {
        match self.get_non_empty(key) {
            None => Ok(None),
            Some(raw) => parse(raw.trim()).map(Some).ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                expected: std::any::type_name::<T>(),
            }),
        }
    }

    /// Derive a new config with `key` set at runtime precedence.
    pub fn with_runtime(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.insert(
            key.to_string(),
            ConfigValue {
                value: Some(value.into()),
                origin: ConfigOrigin::Runtime,
            },
        );
        self
    }

    /// All entries in key order, unset ones included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.value.as_deref()))
    }

    /// Keys with a set value, for variable expansion.
    pub fn set_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.value.as_deref().map(|value| (k.as_str(), value)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_secret(key: &str) -> bool {
        let lower = key.to_ascii_lowercase();
        SECRET_KEYS.iter().any(|s| lower.contains(s))
    }

    /// Redacted view for display and JSON output.
    pub fn snapshot(&self) -> ConfigSnapshot<'_> {
        let mut redactions = Vec::new();
        let entries = self
            .entries
            .iter()
            .map(|(key, entry)| {
                let value = match entry.value.as_deref() {
                    Some(_) if Self::is_secret(key) => {
                        redactions.push(key.as_str());
                        Some(REDACTED)
                    }
                    other => other,
                };
                (
                    key.as_str(),
                    SnapshotEntry {
                        value,
                        origin: entry.origin,
                    },
                )
            })
            .collect();

        ConfigSnapshot {
            entries,
            redactions,
        }
    }

    /// Human-readable dump, one `key = value  # origin` line per entry.
    pub fn dump(&self) -> String {
        let snapshot = self.snapshot();
        let width = snapshot.entries.keys().map(|k| k.len()).max().unwrap_or(0);

        let mut out = String::new();
        for (key, entry) in &snapshot.entries {
            let value = entry.value.unwrap_or("<unset>");
            let _ = writeln!(
                out,
                "{:width$} = {}  # {}",
                key,
                value,
                entry.origin.as_str(),
                width = width
            );
        }
        out
    }

    /// Pretty JSON of the redacted snapshot.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("config file {path} not found")]
    NotFound { path: String },

    #[error("{path}:{line}: {reason}")]
    Parse {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("invalid value '{value}' for '{key}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("invalid definition '{0}' (expected key=value)")]
    InvalidDefine(String),
}
