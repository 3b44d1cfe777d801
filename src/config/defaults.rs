//! Built-in defaults (lowest precedence layer)
//!
//! Every key the client understands is declared here, either with a value
//! or explicitly unset, so generated artifacts always see the full key set.

use super::merge::{ConfigLayer, ConfigOrigin};

/// Well-known configuration keys.
pub mod keys {
    pub const TRANSPORT: &str = "transport";
    pub const PREFIX: &str = "prefix";
    pub const USER: &str = "user";
    pub const PASSWORD: &str = "password";
    pub const TRANSPORT_ARGS: &str = "transport_args";
    pub const PROXY: &str = "proxy";
    pub const MAX_DELAY: &str = "max_delay";
    pub const LOCKFILE: &str = "lockfile";
    pub const INCLUDE: &str = "include";
    pub const POLICY: &str = "policy";
    pub const INTERPRETER: &str = "interpreter";
    pub const FETCH_TIMEOUT: &str = "fetch_timeout";
    pub const STRICT_FETCH: &str = "strict_fetch";
    pub const MAILTO: &str = "mailto";
    pub const CONFIG: &str = "config";
    pub const EMIT_RESOLVED: &str = "emit_resolved";
    pub const DUMP: &str = "dump";
    pub const NO_EXECUTE: &str = "no_execute";
    pub const NO_DELETE: &str = "no_delete";
    pub const VERBOSE: &str = "verbose";

    // injected at runtime by the lifecycle controller
    pub const WORKSPACE: &str = "workspace";
    pub const RUN_ID: &str = "run_id";
    pub const MIRROR: &str = "mirror";

    // environment discovery
    pub const HOSTNAME: &str = "hostname";
    pub const FQDN: &str = "fqdn";
    pub const DOMAIN: &str = "domain";
    pub const OS: &str = "os";
    pub const ARCH: &str = "arch";
    pub const KERNEL: &str = "kernel";
}

/// Default config file, skipped silently when absent.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/hostpol.conf";

/// Default lock file.
pub const DEFAULT_LOCKFILE: &str = "/var/lock/hostpol.lock";

/// Default entry policy name under `policies/`.
pub const DEFAULT_POLICY: &str = "default";

/// Built-in default values
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    pub lockfile: String,
    pub policy: String,
    pub interpreter: String,
    /// Seconds; bounds every fetch and sync-tool call
    pub fetch_timeout: u64,
    /// Seconds; 0 disables the splay
    pub max_delay: i64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            lockfile: DEFAULT_LOCKFILE.to_string(),
            policy: DEFAULT_POLICY.to_string(),
            interpreter: "/bin/sh".to_string(),
            fetch_timeout: 300,
            max_delay: 0,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a config layer for merging
    pub fn to_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::new(ConfigOrigin::Builtin);

        layer.set(keys::LOCKFILE, &self.lockfile);
        layer.set(keys::POLICY, &self.policy);
        layer.set(keys::INTERPRETER, &self.interpreter);
        layer.set(keys::FETCH_TIMEOUT, self.fetch_timeout.to_string());
        layer.set(keys::MAX_DELAY, self.max_delay.to_string());
        layer.set(keys::CONFIG, DEFAULT_CONFIG_FILE);

        for flag in [
            keys::STRICT_FETCH,
            keys::DUMP,
            keys::NO_EXECUTE,
            keys::NO_DELETE,
            keys::VERBOSE,
        ] {
            layer.set(flag, "0");
        }

        for declared in [
            keys::TRANSPORT,
            keys::PREFIX,
            keys::USER,
            keys::PASSWORD,
            keys::TRANSPORT_ARGS,
            keys::PROXY,
            keys::INCLUDE,
            keys::MAILTO,
            keys::EMIT_RESOLVED,
        ] {
            layer.declare(declared);
        }

        layer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.lockfile, DEFAULT_LOCKFILE);
        assert_eq!(defaults.policy, "default");
        assert_eq!(defaults.fetch_timeout, 300);
        assert_eq!(defaults.max_delay, 0);
    }

    #[test]
    fn test_to_layer() {
        let layer = BuiltinDefaults::default().to_layer();

        assert_eq!(layer.get(keys::POLICY), Some(Some("default")));
        assert_eq!(layer.get(keys::NO_DELETE), Some(Some("0")));
        // declared but unset
        assert_eq!(layer.get(keys::PREFIX), Some(None));
        assert_eq!(layer.get("nonexistent"), None);
    }
}
