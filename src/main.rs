//! hostpol CLI
//!
//! Entry point for the `hostpol` command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hostpol::config::{keys, parse_define};
use hostpol::transport::TransportRegistry;
use hostpol::{ClientError, ConfigLayer, ConfigOrigin, ConfigSources, Controller, HostFacts, RunOutcome, SignalHandler};

#[derive(Parser, Debug)]
#[command(name = "hostpol")]
#[command(about = "Fetch, assemble and run this host's policy", version)]
struct Cli {
    /// Transport backend (default: inferred from the prefix)
    #[arg(long, short = 't')]
    transport: Option<String>,

    /// Source location holding policies/, modules/ and files/
    #[arg(long, short = 'p')]
    prefix: Option<String>,

    /// Transport user name
    #[arg(long, short = 'u')]
    user: Option<String>,

    /// Transport password
    #[arg(long, short = 'P')]
    password: Option<String>,

    /// Extra arguments for the sync tool, whitespace separated
    #[arg(long, short = 'a', allow_hyphen_values = true)]
    transport_args: Option<String>,

    /// Maximum random delay before fetching, in seconds
    #[arg(long, short = 'd', allow_negative_numbers = true)]
    max_delay: Option<i64>,

    /// Lock file path
    #[arg(long, short = 'l')]
    lockfile: Option<PathBuf>,

    /// File whose contents are inserted verbatim into the artifact
    #[arg(long, short = 'i')]
    include: Option<PathBuf>,

    /// Config file (default: /etc/hostpol.conf if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Entry policy name under policies/
    #[arg(long)]
    policy: Option<String>,

    /// Interpreter used to run the artifact
    #[arg(long)]
    interpreter: Option<PathBuf>,

    /// Bound on each fetch or sync-tool call, in seconds
    #[arg(long)]
    fetch_timeout: Option<u64>,

    /// Abort when a directive fetch fails
    #[arg(long)]
    strict_fetch: bool,

    /// Mail collected policy logs to this address
    #[arg(long)]
    mailto: Option<String>,

    /// Explicit HTTP proxy ("none" disables proxies)
    #[arg(long)]
    proxy: Option<String>,

    /// Set an arbitrary config key (repeatable)
    #[arg(long = "define", short = 'D', value_name = "KEY=VALUE")]
    defines: Vec<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump: bool,

    /// Print --dump output as JSON
    #[arg(long, requires = "dump")]
    json: bool,

    /// Build the artifact but do not run it
    #[arg(long, short = 'n')]
    no_execute: bool,

    /// Keep the workspace and artifact after the run
    #[arg(long)]
    no_delete: bool,

    /// Increase log verbosity (repeatable)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// List available transports and exit
    #[arg(long)]
    list_transports: bool,

    /// Write the resolved policy and config snapshot as JSON
    #[arg(long, value_name = "PATH")]
    emit_resolved: Option<PathBuf>,
}

impl Cli {
    /// Config layer holding only the flags that were given.
    fn to_layer(&self) -> Result<ConfigLayer, ClientError> {
        let mut layer = ConfigLayer::new(ConfigOrigin::Cli);

        // -D first so dedicated flags win
        for raw in &self.defines {
            let (key, value) = parse_define(raw)?;
            layer.set(key, value);
        }

        let strings = [
            (keys::TRANSPORT, self.transport.clone()),
            (keys::PREFIX, self.prefix.clone()),
            (keys::USER, self.user.clone()),
            (keys::PASSWORD, self.password.clone()),
            (keys::TRANSPORT_ARGS, self.transport_args.clone()),
            (keys::MAX_DELAY, self.max_delay.map(|d| d.to_string())),
            (keys::LOCKFILE, path_string(&self.lockfile)),
            (keys::INCLUDE, path_string(&self.include)),
            (keys::CONFIG, path_string(&self.config)),
            (keys::POLICY, self.policy.clone()),
            (keys::INTERPRETER, path_string(&self.interpreter)),
            (keys::FETCH_TIMEOUT, self.fetch_timeout.map(|t| t.to_string())),
            (keys::MAILTO, self.mailto.clone()),
            (keys::PROXY, self.proxy.clone()),
            (keys::EMIT_RESOLVED, path_string(&self.emit_resolved)),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                layer.set(key, value);
            }
        }

        let flags = [
            (keys::STRICT_FETCH, self.strict_fetch),
            (keys::DUMP, self.dump),
            (keys::NO_EXECUTE, self.no_execute),
            (keys::NO_DELETE, self.no_delete),
        ];
        for (key, set) in flags {
            if set {
                layer.set(key, "1");
            }
        }

        if self.verbose > 0 {
            layer.set(keys::VERBOSE, self.verbose.to_string());
        }

        Ok(layer)
    }
}

fn path_string(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.display().to_string())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.list_transports {
        for name in TransportRegistry::with_builtin().names() {
            println!("{}", name);
        }
        return ExitCode::SUCCESS;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("hostpol: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn run(cli: &Cli) -> Result<(), ClientError> {
    let facts = HostFacts::probe();
    tracing::debug!(hostname = %facts.hostname, fqdn = %facts.fqdn, os = %facts.os, "host discovered");

    let config = ConfigSources::new(cli.to_layer()?)
        .with_discovery(facts.to_layer())
        .build()?;

    let signals = SignalHandler::new();
    if let Err(e) = signals.install() {
        tracing::warn!(error = %e, "cannot install signal handlers");
    }

    let outcome = Controller::new(config)
        .with_signals(signals.state())
        .dump_json(cli.json)
        .run()?;

    match outcome {
        RunOutcome::Dumped(text) => print!("{}", text),
        RunOutcome::NoPolicy => {}
        RunOutcome::Built { artifact, sha256, kept } => {
            println!("{}", built_message(&artifact, &sha256, kept));
        }
        RunOutcome::Executed { report, .. } => {
            tracing::debug!(code = ?report.code, "run finished");
        }
    }

    Ok(())
}

/// Report line for a build without execution. A discarded artifact's path
/// would point at a removed workspace, so only its digest is shown.
fn built_message(artifact: &Path, sha256: &str, kept: bool) -> String {
    if kept {
        format!("{} sha256:{}", artifact.display(), sha256)
    } else {
        format!("artifact discarded sha256:{} (use --no-delete to keep it)", sha256)
    }
}
