//! Layered config: defaults < discovery < file < CLI.

use std::io::Write;

use hostpol::config::{keys, REDACTED};
use hostpol::{ConfigError, ConfigLayer, ConfigOrigin, ConfigSources, HostFacts};

fn discovery() -> ConfigLayer {
    let mut layer = HostFacts::from_parts(
        "web1".to_string(),
        "web1.example.com".to_string(),
        "linux".to_string(),
        "x86_64".to_string(),
        Some("6.1.0".to_string()),
    )
    .to_layer();
    // discovery may also shadow defaults
    layer.set(keys::POLICY, "from-discovery");
    layer
}

#[test]
fn test_each_layer_overrides_the_previous() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# site config").unwrap();
    writeln!(file, "policy = from-file").unwrap();
    writeln!(file, "max_delay = 120").unwrap();
    writeln!(file, "hostname = renamed   # trailing comment").unwrap();

    let mut cli = ConfigLayer::new(ConfigOrigin::Cli);
    cli.set(keys::MAX_DELAY, "5");

    let config = ConfigSources::new(cli)
        .with_discovery(discovery())
        .with_default_file(Some(file.path().to_path_buf()))
        .build()
        .unwrap();

    assert_eq!(config.get(keys::INTERPRETER), Some("/bin/sh"));
    assert_eq!(config.origin(keys::INTERPRETER), Some(ConfigOrigin::Builtin));

    assert_eq!(config.get(keys::DOMAIN), Some("example.com"));
    assert_eq!(config.origin(keys::DOMAIN), Some(ConfigOrigin::Discovery));

    assert_eq!(config.get(keys::POLICY), Some("from-file"));
    assert_eq!(config.get(keys::HOSTNAME), Some("renamed"));
    assert_eq!(config.origin(keys::HOSTNAME), Some(ConfigOrigin::File));

    assert_eq!(config.get(keys::MAX_DELAY), Some("5"));
    assert_eq!(config.origin(keys::MAX_DELAY), Some(ConfigOrigin::Cli));
}

#[test]
fn test_explicit_config_path_from_cli() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.toml");
    std::fs::write(&path, "prefix = \"/srv/policy\"\nno_delete = true\n").unwrap();

    let mut cli = ConfigLayer::new(ConfigOrigin::Cli);
    cli.set(keys::CONFIG, path.display().to_string());

    let config = ConfigSources::new(cli)
        .with_default_file(Some(dir.path().join("ignored.conf")))
        .build()
        .unwrap();

    assert_eq!(config.get(keys::PREFIX), Some("/srv/policy"));
    assert!(config.get_bool(keys::NO_DELETE));
    assert_eq!(config.get(keys::CONFIG), Some(path.display().to_string().as_str()));
}

#[test]
fn test_malformed_file_is_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "this is not a pair").unwrap();

    let err = ConfigSources::new(ConfigLayer::new(ConfigOrigin::Cli))
        .with_default_file(Some(file.path().to_path_buf()))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
}

#[test]
fn test_all_known_keys_present() {
    let config = ConfigSources::new(ConfigLayer::new(ConfigOrigin::Cli))
        .with_default_file(None)
        .build()
        .unwrap();

    for key in [
        keys::TRANSPORT,
        keys::PREFIX,
        keys::USER,
        keys::PASSWORD,
        keys::MAX_DELAY,
        keys::LOCKFILE,
        keys::INCLUDE,
        keys::NO_EXECUTE,
    ] {
        assert!(config.contains(key), "{key}");
    }
}

#[test]
fn test_dump_redacts_secrets() {
    let mut cli = ConfigLayer::new(ConfigOrigin::Cli);
    cli.set(keys::PASSWORD, "hunter2");
    let config = ConfigSources::new(cli).with_default_file(None).build().unwrap();

    let dump = config.dump();
    assert!(!dump.contains("hunter2"));
    assert!(dump
        .lines()
        .any(|line| line.starts_with("password") && line.contains(REDACTED) && line.ends_with("# cli")));

    // the real value is still available to the run
    assert_eq!(config.get(keys::PASSWORD), Some("hunter2"));
}
