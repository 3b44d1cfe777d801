//! Configuration layers and merge logic
//!
//! Implements the 4-layer merge, lowest precedence first:
//! built-in defaults, environment discovery, config file, CLI flags.
//!
//! Merge semantics:
//! - A set value in a later layer overrides any earlier value
//! - A declared-but-unset key only fills in keys no earlier layer has

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Origin of a configuration value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Discovery,
    File,
    Cli,
    Runtime,
}

impl ConfigOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigOrigin::Builtin => "builtin",
            ConfigOrigin::Discovery => "discovery",
            ConfigOrigin::File => "file",
            ConfigOrigin::Cli => "cli",
            ConfigOrigin::Runtime => "runtime",
        }
    }
}

/// One source of configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    origin: ConfigOrigin,
    entries: BTreeMap<String, Option<String>>,
}

impl ConfigLayer {
    pub fn new(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            entries: BTreeMap::new(),
        }
    }

    pub fn origin(&self) -> ConfigOrigin {
        self.origin
    }

    /// Set `key` to `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), Some(value.into()));
    }

    /// Declare `key` without a value. Does not clear an existing value.
    pub fn declare(&mut self, key: impl Into<String>) {
        self.entries.entry(key.into()).or_insert(None);
    }

    /// `None` if the key is absent, `Some(None)` if declared but unset.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries.get(key).map(|v| v.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, Option<String>)> {
        self.entries.into_iter()
    }
}

/// A merged value together with the layer it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigValue {
    pub value: Option<String>,
    pub origin: ConfigOrigin,
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<ConfigLayer>) -> BTreeMap<String, ConfigValue> {
    let mut merged: BTreeMap<String, ConfigValue> = BTreeMap::new();

    for layer in layers {
        let origin = layer.origin();
        for (key, value) in layer.into_entries() {
            match value {
                Some(value) => {
                    merged.insert(
                        key,
                        ConfigValue {
                            value: Some(value),
                            origin,
                        },
                    );
                }
                None => {
                    merged.entry(key).or_insert(ConfigValue {
                        value: None,
                        origin,
                    });
                }
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(origin: ConfigOrigin, pairs: &[(&str, &str)]) -> ConfigLayer {
        let mut layer = ConfigLayer::new(origin);
        for (k, v) in pairs {
            layer.set(*k, *v);
        }
        layer
    }

    #[test]
    fn test_scalar_override() {
        let merged = merge_layers(vec![
            layer(ConfigOrigin::Builtin, &[("max_delay", "0")]),
            layer(ConfigOrigin::File, &[("max_delay", "60")]),
        ]);
        assert_eq!(merged["max_delay"].value.as_deref(), Some("60"));
        assert_eq!(merged["max_delay"].origin, ConfigOrigin::File);
    }

    #[test]
    fn test_precedence_order() {
        let merged = merge_layers(vec![
            layer(ConfigOrigin::Builtin, &[("a", "builtin"), ("b", "builtin"), ("c", "builtin")]),
            layer(ConfigOrigin::Discovery, &[("b", "discovery"), ("c", "discovery")]),
            layer(ConfigOrigin::File, &[("c", "file"), ("d", "file")]),
            layer(ConfigOrigin::Cli, &[("d", "cli")]),
        ]);

        assert_eq!(merged["a"].value.as_deref(), Some("builtin"));
        assert_eq!(merged["b"].value.as_deref(), Some("discovery"));
        assert_eq!(merged["c"].value.as_deref(), Some("file"));
        assert_eq!(merged["d"].value.as_deref(), Some("cli"));
    }

    #[test]
    fn test_unset_does_not_clobber() {
        let mut cli = ConfigLayer::new(ConfigOrigin::Cli);
        cli.declare("prefix");
        let merged = merge_layers(vec![layer(ConfigOrigin::File, &[("prefix", "/srv")]), cli]);
        assert_eq!(merged["prefix"].value.as_deref(), Some("/srv"));
    }

    #[test]
    fn test_declared_key_kept() {
        let mut builtin = ConfigLayer::new(ConfigOrigin::Builtin);
        builtin.declare("user");
        let merged = merge_layers(vec![builtin]);
        assert!(merged.contains_key("user"));
        assert_eq!(merged["user"].value, None);
    }

    #[test]
    fn test_declare_keeps_existing_value() {
        let mut layer = ConfigLayer::new(ConfigOrigin::Cli);
        layer.set("k", "v");
        layer.declare("k");
        assert_eq!(layer.get("k"), Some(Some("v")));
    }
}
