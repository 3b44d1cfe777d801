//! Host environment discovery.
//!
//! Collects hostname, domain and platform facts into a config layer that sits
//! above the built-in defaults and below the config file.

use std::process::Command;

use crate::config::{keys, ConfigLayer, ConfigOrigin};

/// Discovered host facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub hostname: String,
    pub fqdn: String,
    /// Everything after the first `.` of the fqdn, if any
    pub domain: Option<String>,
    pub os: String,
    pub arch: String,
    pub kernel: Option<String>,
}

impl HostFacts {
    /// Probe the running host.
    pub fn probe() -> Self {
        let hostname = get_hostname();
        let fqdn = get_fqdn(&hostname);
        Self::from_parts(hostname, fqdn, get_os(), get_architecture(), get_kernel())
    }

    /// Assemble facts, deriving `domain` from `fqdn`.
    pub fn from_parts(
        hostname: String,
        fqdn: String,
        os: String,
        arch: String,
        kernel: Option<String>,
    ) -> Self {
        let domain = fqdn
            .split_once('.')
            .map(|(_, domain)| domain.to_string())
            .filter(|d| !d.is_empty());

        Self {
            hostname,
            fqdn,
            domain,
            os,
            arch,
            kernel,
        }
    }

    /// Discovery-origin config layer.
    pub fn to_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::new(ConfigOrigin::Discovery);
        layer.set(keys::HOSTNAME, &self.hostname);
        layer.set(keys::FQDN, &self.fqdn);
        layer.set(keys::OS, &self.os);
        layer.set(keys::ARCH, &self.arch);

        match self.domain {
            Some(ref domain) => layer.set(keys::DOMAIN, domain),
            None => layer.declare(keys::DOMAIN),
        }
        match self.kernel {
            Some(ref kernel) => layer.set(keys::KERNEL, kernel),
            None => layer.declare(keys::KERNEL),
        }

        layer
    }
}

fn get_hostname() -> String {
    run_command("hostname", &[])
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// `hostname -f`, falling back to the short name.
fn get_fqdn(hostname: &str) -> String {
    run_command("hostname", &["-f"])
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| hostname.to_string())
}

fn get_os() -> String {
    run_command("uname", &["-s"])
        .map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or_else(|_| std::env::consts::OS.to_string())
}

fn get_architecture() -> String {
    run_command("uname", &["-m"])
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| std::env::consts::ARCH.to_string())
}

fn get_kernel() -> Option<String> {
    run_command("uname", &["-r"])
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn run_command(cmd: &str, args: &[&str]) -> Result<String, std::io::Error> {
    let output = Command::new(cmd).args(args).output()?;

    if output.status.success() {
        String::from_utf8(output.stdout)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{} exited with {:?}", cmd, output.status.code()),
        ))
    }
}
