//! Directive tokenizer.
//!
//! Grammar, applied to a single line:
//!
//! ```text
//! line  := ws* KEYWORD sep expr ws* ';'? ws*
//! sep   := ws+ | lookahead('(' | '"' | '\'')
//! expr  := quoted | '(' ws* (quoted | bare) ws* ')' | bare
//! quoted:= '"' [^"]* '"' | '\'' [^']* '\''
//! bare  := [^ \t;()"']+
//! ```
//!
//! Lines that do not match are not directives and pass through untouched.

use serde::{Deserialize, Serialize};

/// Which fetch a directive triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectiveKind {
    /// Inline a policy document from `policies/`.
    FetchPolicy,
    /// Collect a module from `modules/`.
    FetchModule,
}

impl DirectiveKind {
    const ALL: [DirectiveKind; 2] = [DirectiveKind::FetchPolicy, DirectiveKind::FetchModule];

    /// The keyword as written in a policy document.
    pub fn keyword(&self) -> &'static str {
        match self {
            DirectiveKind::FetchPolicy => "FetchPolicy",
            DirectiveKind::FetchModule => "FetchModule",
        }
    }

    /// Source subdirectory the expression is resolved against.
    pub fn subdir(&self) -> &'static str {
        match self {
            DirectiveKind::FetchPolicy => "policies/",
            DirectiveKind::FetchModule => "modules/",
        }
    }
}

/// A recognized directive line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// The expression with quoting removed, before variable expansion.
    pub expr: String,
}

/// Returns true for lines that are never scanned for directives:
/// blank lines and `#` comments (after optional whitespace).
pub fn is_passthrough(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parse one line into a directive.
///
/// Returns `None` for anything that is not a well-formed directive,
/// including comments and blank lines.
pub fn parse_directive(line: &str) -> Option<Directive> {
    if is_passthrough(line) {
        return None;
    }

    let rest = line.trim_start();
    let (kind, rest) = DirectiveKind::ALL
        .iter()
        .find_map(|kind| rest.strip_prefix(kind.keyword()).map(|r| (*kind, r)))?;

    // `FetchPolicyFoo` is an ordinary word, not a directive
    let sep = rest.chars().next()?;
    if !(sep.is_whitespace() || sep == '(' || sep == '"' || sep == '\'') {
        return None;
    }

    let (expr, tail) = parse_expr(rest.trim_start())?;
    if expr.is_empty() {
        return None;
    }

    let tail = tail.trim();
    let tail = tail.strip_suffix(';').unwrap_or(tail);
    if !tail.trim_end().is_empty() {
        return None;
    }

    Some(Directive { kind, expr })
}

/// Parse an expression, returning it together with the unconsumed tail.
fn parse_expr(s: &str) -> Option<(String, &str)> {
    if let Some(inner) = s.strip_prefix('(') {
        let inner = inner.trim_start();
        let (expr, tail) = if starts_with_quote(inner) {
            parse_quoted(inner)?
        } else {
            parse_bare(inner)?
        };
        let tail = tail.trim_start().strip_prefix(')')?;
        return Some((expr, tail));
    }

    if starts_with_quote(s) {
        return parse_quoted(s);
    }

    parse_bare(s)
}

fn starts_with_quote(s: &str) -> bool {
    s.starts_with('"') || s.starts_with('\'')
}

fn parse_quoted(s: &str) -> Option<(String, &str)> {
    let quote = s.chars().next()?;
    let body = &s[1..];
    let end = body.find(quote)?;
    Some((body[..end].trim().to_string(), &body[end + 1..]))
}

fn parse_bare(s: &str) -> Option<(String, &str)> {
    let end = s
        .find(|c: char| c.is_whitespace() || matches!(c, ';' | '(' | ')' | '"' | '\''))
        .unwrap_or(s.len());
    let token = &s[..end];
    let tail = &s[end..];

    // a quote or paren glued to a bare token is malformed
    if tail.starts_with(|c: char| matches!(c, '(' | '"' | '\'')) {
        return None;
    }

    Some((token.to_string(), tail))
}
