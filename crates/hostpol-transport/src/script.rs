//! Shell quoting for generated scripts.

/// Quote `value` as a single POSIX shell word.
///
/// Embedded single quotes are closed, escaped and reopened, so the result
/// never terminates early.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain() {
        assert_eq!(shell_quote("web"), "'web'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_embedded_quote() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_metacharacters_stay_literal() {
        assert_eq!(shell_quote("$(rm -rf /); `x`"), "'$(rm -rf /); `x`'");
    }
}
