//! Artifact layout, quoting and file mode.

use std::process::Command;

use hostpol::artifact::{render, ArtifactBuilder, SECTIONS};
use hostpol::config::keys;
use hostpol::mock::MockTransport;
use hostpol::resolver::ResolvedArtifact;
use hostpol::{Config, ConfigLayer, ConfigOrigin};

const HOSTILE: &str = "it's'; touch pwned; echo '$(id) `id` \"q\" \\";

fn config() -> Config {
    let mut layer = ConfigLayer::new(ConfigOrigin::Cli);
    layer.set(keys::FQDN, "web1.example.com");
    layer.set(keys::RUN_ID, "0000-test");
    layer.set("hostile", HOSTILE);
    layer.set("site.name", "berlin");
    layer.declare(keys::PREFIX);
    Config::from_layers(vec![layer])
}

fn resolved() -> ResolvedArtifact {
    ResolvedArtifact {
        policy: "default".to_string(),
        policy_text: "echo policy-body\nhelper\n".to_string(),
        module_text: "# FetchModule helper\nhelper() { echo module-body; }\n".to_string(),
        directives: Vec::new(),
    }
}

#[test]
fn test_sections_in_order() {
    let config = config();
    let transport = MockTransport::new();
    let artifact = ArtifactBuilder::new(&config, &transport)
        .with_include("echo include-body\n")
        .build(&resolved());
    let text = artifact.text();

    let mut last = 0;
    for name in SECTIONS.iter().chain(["entry point"].iter()) {
        let marker = render::section(name);
        let pos = text.find(&marker).unwrap_or_else(|| panic!("missing section {name}"));
        assert!(pos >= last, "section {name} out of order");
        last = pos;
    }

    let body = text.find("echo policy-body").unwrap();
    let include = text.find("echo include-body").unwrap();
    let module = text.find("helper() { echo module-body; }").unwrap();
    let fetch_file = text.find("fetch_file()").unwrap();
    assert!(fetch_file < body && body < include && include < module);
}

#[test]
fn test_unset_keys_declared_unset() {
    let config = config();
    let transport = MockTransport::new();
    let artifact = ArtifactBuilder::new(&config, &transport).build(&resolved());
    assert!(artifact.text().contains("\nunset prefix\n"));
    assert!(artifact.text().contains("\nsite_name='berlin'\n"));
}

#[test]
fn test_values_cannot_break_out_of_literals() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();

    let script = format!(
        "{}\n{}\nprintf '%s' \"$hostile\" > var.out\nconfig_get hostile > get.out\nconfig_keys > keys.out\n",
        render::declarations(&config),
        render::lookup(&config),
    );

    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(&script)
        .current_dir(dir.path())
        .status()
        .unwrap();
    assert!(status.success());

    assert!(!dir.path().join("pwned").exists());
    assert_eq!(std::fs::read_to_string(dir.path().join("var.out")).unwrap(), HOSTILE);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("get.out")).unwrap(),
        format!("{}\n", HOSTILE)
    );

    let keys = std::fs::read_to_string(dir.path().join("keys.out")).unwrap();
    assert!(keys.lines().any(|k| k == "site.name"));
    assert!(!keys.lines().any(|k| k == "prefix"));
}

#[test]
fn test_policy_can_call_later_module() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!(
        "{}{}\npolicy_main > out.txt\n",
        render::policy_body("helper\n"),
        "helper() { echo from-module; }\n",
    );

    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(&script)
        .current_dir(dir.path())
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "from-module\n");
}

#[test]
fn test_log_buffer_flushes_by_severity() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let script = format!(
        "{}{}\nlog_info first info\nalert wake up\nlog_debug noise\nlog_msg bogus odd level\nflush_logs\n",
        render::log_buffer(&config),
        render::log_flush(),
    );

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(&script)
        .env("TMPDIR", dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        stdout,
        "hostpol report for web1.example.com\n[alert]\nwake up\n[info]\nfirst info\nodd level\n[debug]\nnoise\n"
    );
    // the log dir is removed on exit
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_flush_without_logs_is_silent() {
    let config = config();
    let script = format!("{}{}\nflush_logs\n", render::log_buffer(&config), render::log_flush());
    let output = Command::new("/bin/sh").arg("-c").arg(&script).output().unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[cfg(unix)]
#[test]
fn test_written_with_owner_only_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.sh");
    let config = config();
    let transport = MockTransport::new();

    let artifact = ArtifactBuilder::new(&config, &transport).build(&resolved());
    artifact.write_to(&path).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), artifact.text());
}
