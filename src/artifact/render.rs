//! Script sections
//!
//! Each function renders one section of the generated POSIX `sh` script.
//! Every config value is embedded as a single-quoted literal.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use hostpol_transport::shell_quote;

use crate::config::{keys, Config};

/// Marker line opening each section.
pub fn section(name: &str) -> String {
    format!("# --- {} ---\n", name)
}

/// Map a config key to a shell identifier.
pub fn shell_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Shell names shared by more than one config key, with those keys in
/// key order.
pub fn shell_name_collisions(config: &Config) -> Vec<(String, Vec<&str>)> {
    let mut by_name: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (key, _) in config.iter() {
        by_name.entry(shell_name(key)).or_default().push(key);
    }
    by_name.into_iter().filter(|(_, keys)| keys.len() > 1).collect()
}

/// `name='value'` or `unset name` per config entry.
///
/// Keys that map to the same shell name are declared in key order, so the
/// last one wins; `config_get` still sees every key.
pub fn declarations(config: &Config) -> String {
    for (name, keys) in shell_name_collisions(config) {
        tracing::warn!(
            %name,
            keys = %keys.join(", "),
            "config keys share a shell variable; use config_get to read each"
        );
    }

    let mut out = String::new();
    for (key, value) in config.iter() {
        let name = shell_name(key);
        let _ = match value {
            Some(value) => writeln!(out, "{}={}", name, shell_quote(value)),
            None => writeln!(out, "unset {}", name),
        };
    }
    out
}

/// `config_get <key>` and `config_keys`, keyed by original key names.
pub fn lookup(config: &Config) -> String {
    let mut out = String::from("config_get() {\n    case \"$1\" in\n");
    let mut set_keys = Vec::new();

    for (key, value) in config.set_values() {
        let _ = writeln!(
            out,
            "        {}) printf '%s\\n' {} ;;",
            shell_quote(key),
            shell_quote(value)
        );
        set_keys.push(shell_quote(key));
    }

    out.push_str("        *) return 1 ;;\n    esac\n}\n\n");
    out.push_str("config_keys() {\n");
    if set_keys.is_empty() {
        out.push_str("    :\n");
    } else {
        let _ = writeln!(out, "    printf '%s\\n' {}", set_keys.join(" "));
    }
    out.push_str("}\n");
    out
}

/// Per-level log buffer kept in a private temp dir.
pub fn log_buffer(config: &Config) -> String {
    let fqdn = config.get(keys::FQDN).unwrap_or("");
    let mailto = config.get(keys::MAILTO).unwrap_or("");

    format!(
        r#"HOSTPOL_FQDN={fqdn}
HOSTPOL_MAILTO={mailto}
HOSTPOL_LOGDIR=$(mktemp -d "${{TMPDIR:-/tmp}}/hostpol-log.XXXXXX") || exit 1
trap 'rm -rf "$HOSTPOL_LOGDIR"' EXIT

log_msg() {{
    case "$1" in
        alert|error|warn|info|debug) _hostpol_level=$1 ;;
        *) _hostpol_level=info ;;
    esac
    shift
    printf '%s\n' "$*" >> "$HOSTPOL_LOGDIR/$_hostpol_level"
}}
log_debug() {{ log_msg debug "$@"; }}
log_info() {{ log_msg info "$@"; }}
log_warn() {{ log_msg warn "$@"; }}
log_error() {{ log_msg error "$@"; }}
alert() {{ log_msg alert "$@"; }}
"#,
        fqdn = shell_quote(fqdn),
        mailto = shell_quote(mailto),
    )
}

/// Abort unless running as root.
pub fn privilege_check() -> String {
    r#"if [ "$(id -u)" -ne 0 ]; then
    echo "hostpol: policy must run as root" >&2
    exit 1
fi
"#
    .to_string()
}

/// The resolved body wrapped in `policy_main`.
pub fn policy_body(policy_text: &str) -> String {
    let mut out = String::with_capacity(policy_text.len() + 32);
    out.push_str("policy_main() {\n    :\n");
    out.push_str(policy_text);
    if !policy_text.is_empty() && !policy_text.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

/// `flush_logs`: mail or print the buffered messages, most severe first.
pub fn log_flush() -> String {
    r#"flush_logs() {
    : > "$HOSTPOL_LOGDIR/report"
    for _hostpol_level in alert error warn info debug; do
        if [ -s "$HOSTPOL_LOGDIR/$_hostpol_level" ]; then
            printf '[%s]\n' "$_hostpol_level" >> "$HOSTPOL_LOGDIR/report"
            cat "$HOSTPOL_LOGDIR/$_hostpol_level" >> "$HOSTPOL_LOGDIR/report"
        fi
    done
    [ -s "$HOSTPOL_LOGDIR/report" ] || return 0

    _hostpol_host=${HOSTPOL_FQDN:-$(hostname 2>/dev/null)}
    if [ -n "$HOSTPOL_MAILTO" ] && command -v mail >/dev/null 2>&1; then
        mail -s "hostpol report for $_hostpol_host" "$HOSTPOL_MAILTO" < "$HOSTPOL_LOGDIR/report"
    else
        printf 'hostpol report for %s\n' "$_hostpol_host"
        cat "$HOSTPOL_LOGDIR/report"
    fi
}
"#
    .to_string()
}

/// Final call sequence.
pub fn entry_point() -> String {
    "policy_main\nHOSTPOL_STATUS=$?\nflush_logs\nexit $HOSTPOL_STATUS\n".to_string()
}
