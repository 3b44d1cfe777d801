//! Policy resolution
//!
//! Fetches the entry policy and resolves its `FetchPolicy` / `FetchModule`
//! directives into a policy body and a separate module bundle. Inclusion is
//! single-level: fetched text is inserted verbatim and never scanned again.

use hostpol_directive::{is_passthrough, parse_directive, Directive, DirectiveKind, Expander};
use hostpol_transport::Transport;
use serde::Serialize;
use thiserror::Error;

use crate::config::{keys, Config, DEFAULT_POLICY};

/// Subdirectory holding entry and included policies.
pub const POLICY_DIR: &str = "policies/";

/// Resolution errors. Only raised when `strict_fetch` is set.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{keyword} {target}: {reason}")]
    Fetch {
        keyword: &'static str,
        target: String,
        reason: String,
    },
}

/// Result of one directive fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FetchStatus {
    Fetched { bytes: usize },
    Failed { reason: String },
}

/// A directive as it was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDirective {
    /// 1-based line in the entry policy
    pub line: usize,
    pub kind: DirectiveKind,
    /// Expression as written
    pub expr: String,
    /// Expression after variable expansion
    pub target: String,
    #[serde(flatten)]
    pub status: FetchStatus,
}

/// Resolved policy body plus module bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArtifact {
    /// Entry policy name under `policies/`
    pub policy: String,
    pub policy_text: String,
    pub module_text: String,
    pub directives: Vec<ResolvedDirective>,
}

impl ResolvedArtifact {
    pub fn failed_directives(&self) -> impl Iterator<Item = &ResolvedDirective> {
        self.directives
            .iter()
            .filter(|d| matches!(d.status, FetchStatus::Failed { .. }))
    }
}

/// Resolves an entry policy against a transport.
pub struct PolicyResolver<'a> {
    transport: &'a dyn Transport,
    config: &'a Config,
    strict: bool,
}

impl<'a> PolicyResolver<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a Config) -> Self {
        Self {
            transport,
            config,
            strict: config.get_bool(keys::STRICT_FETCH),
        }
    }

    /// Override `strict_fetch`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Entry policy name from config.
    pub fn policy_name(&self) -> &'a str {
        self.config
            .get_non_empty(keys::POLICY)
            .unwrap_or(DEFAULT_POLICY)
    }

    /// Fetch and resolve the entry policy.
    ///
    /// `Ok(None)` when the entry policy cannot be fetched.
    pub fn resolve(&self) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let name = self.policy_name();

        let entry = match self.transport.fetch_contents(POLICY_DIR, name) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!(policy = name, error = %e, "no policy");
                return Ok(None);
            }
        };

        tracing::info!(policy = name, bytes = entry.len(), "fetched entry policy");
        self.resolve_text(name, &entry).map(Some)
    }

    /// Resolve directives in already-fetched entry text.
    pub fn resolve_text(&self, name: &str, entry: &str) -> Result<ResolvedArtifact, ResolveError> {
        let expander = Expander::new(self.config.set_values());
        let mut policy_text = String::with_capacity(entry.len());
        let mut module_text = String::new();
        let mut directives = Vec::new();

        for (idx, line) in entry.lines().enumerate() {
            let directive = if is_passthrough(line) {
                None
            } else {
                parse_directive(line)
            };

            let Some(Directive { kind, expr }) = directive else {
                policy_text.push_str(line);
                policy_text.push('\n');
                continue;
            };

            let target = expander.expand(&expr);
            let out = match kind {
                DirectiveKind::FetchPolicy => &mut policy_text,
                DirectiveKind::FetchModule => &mut module_text,
            };

            let status = match self.transport.fetch_contents(kind.subdir(), &target) {
                Ok(bytes) => {
                    tracing::debug!(keyword = kind.keyword(), %target, bytes = bytes.len(), "fetched");
                    out.push_str(&format!("# {} {}\n", kind.keyword(), target));
                    let text = String::from_utf8_lossy(&bytes);
                    out.push_str(&text);
                    if !text.is_empty() && !text.ends_with('\n') {
                        out.push('\n');
                    }
                    FetchStatus::Fetched { bytes: bytes.len() }
                }
                Err(e) => {
                    let reason = single_line(&e.to_string());
                    if self.strict {
                        return Err(ResolveError::Fetch {
                            keyword: kind.keyword(),
                            target,
                            reason,
                        });
                    }
                    tracing::warn!(keyword = kind.keyword(), %target, %reason, "fetch failed");
                    out.push_str(&format!("# {} {} failed: {}\n", kind.keyword(), target, reason));
                    FetchStatus::Failed { reason }
                }
            };

            directives.push(ResolvedDirective {
                line: idx + 1,
                kind,
                expr,
                target,
                status,
            });
        }

        Ok(ResolvedArtifact {
            policy: name.to_string(),
            policy_text,
            module_text,
            directives,
        })
    }
}

/// Collapse a possibly multi-line message so it fits in one comment line.
fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("git exited with 128:\nfatal: nope\n"), "git exited with 128: fatal: nope");
    }
}
