//! Config file loading
//!
//! Two formats are accepted:
//! - `key = value` lines (the default). `#` starts a comment at the start of
//!   a line or after whitespace, a trailing `\` joins the next line, values
//!   may be wrapped in single or double quotes.
//! - A flat TOML table, for paths ending in `.toml`. Scalars and arrays of
//!   scalars are stored as strings; arrays are joined with spaces.

use std::fs;
use std::path::Path;

use regex_lite::Regex;
use sha2::{Digest, Sha256};

use super::effective::ConfigError;
use super::merge::{ConfigLayer, ConfigOrigin};

/// Accepted key syntax
const KEY_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_.\-]*$";

/// A parsed config file with its provenance
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub path: String,
    /// SHA-256 of the raw file bytes
    pub digest: String,
    pub layer: ConfigLayer,
}

impl ConfigFile {
    /// Load `path`, choosing the format from its extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let shown = path.display().to_string();
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: shown.clone(),
                }
            } else {
                ConfigError::Io {
                    path: shown.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
            path: shown.clone(),
            line: 0,
            reason: format!("invalid UTF-8: {}", e),
        })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let layer = if is_toml {
            parse_toml(&shown, &contents)?
        } else {
            parse_key_values(&shown, &contents)?
        };

        tracing::debug!(path = %shown, %digest, keys = layer.len(), "loaded config file");

        Ok(Self {
            path: shown,
            digest,
            layer,
        })
    }
}

/// Parse `key = value` text into a file-origin layer.
pub fn parse_key_values(path: &str, contents: &str) -> Result<ConfigLayer, ConfigError> {
    let key_re = key_regex(path)?;
    let mut layer = ConfigLayer::new(ConfigOrigin::File);

    for (line_no, line) in logical_lines(contents) {
        let line = strip_comment(&line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Parse {
            path: path.to_string(),
            line: line_no,
            reason: format!("expected key = value, got '{}'", line),
        })?;

        let key = key.trim();
        if !key_re.is_match(key) {
            return Err(ConfigError::Parse {
                path: path.to_string(),
                line: line_no,
                reason: format!("invalid key '{}'", key),
            });
        }

        layer.set(key, unquote(value.trim()));
    }

    Ok(layer)
}

/// Parse a flat TOML table into a file-origin layer.
pub fn parse_toml(path: &str, contents: &str) -> Result<ConfigLayer, ConfigError> {
    let table: toml::Table = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_string(),
        line: 0,
        reason: format!("TOML parse error: {}", e),
    })?;

    let key_re = key_regex(path)?;
    let mut layer = ConfigLayer::new(ConfigOrigin::File);

    for (key, value) in table {
        let invalid = |reason: String| ConfigError::Parse {
            path: path.to_string(),
            line: 0,
            reason,
        };

        if !key_re.is_match(&key) {
            return Err(invalid(format!("invalid key '{}'", key)));
        }

        let value = match value {
            toml::Value::Array(items) => items
                .into_iter()
                .map(toml_scalar)
                .collect::<Option<Vec<_>>>()
                .map(|items| items.join(" ")),
            other => toml_scalar(other),
        }
        .ok_or_else(|| invalid(format!("'{}' must be a scalar or an array of scalars", key)))?;

        layer.set(key, value);
    }

    Ok(layer)
}

fn toml_scalar(value: toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(if b { "1" } else { "0" }.to_string()),
        toml::Value::Datetime(dt) => Some(dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

fn key_regex(path: &str) -> Result<Regex, ConfigError> {
    Regex::new(KEY_PATTERN).map_err(|e| ConfigError::Parse {
        path: path.to_string(),
        line: 0,
        reason: e.to_string(),
    })
}

/// Join backslash-continued lines. Yields the 1-based number of the first
/// physical line of each logical line.
fn logical_lines(contents: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in contents.lines().enumerate() {
        let (start, mut acc) = match pending.take() {
            Some((start, acc)) => (start, acc + raw.trim_start()),
            None => (idx + 1, raw.to_string()),
        };

        if acc.ends_with('\\') && !is_comment_line(&acc) {
            acc.pop();
            pending = Some((start, acc));
        } else {
            out.push((start, acc));
        }
    }

    if let Some(last) = pending {
        out.push(last);
    }
    out
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Remove a `#` comment that starts the line or follows whitespace, outside
/// of quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev_ws = true;

    for (idx, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && prev_ws => return &line[..idx],
            None => {}
        }
        prev_ws = c.is_whitespace();
    }
    line
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
