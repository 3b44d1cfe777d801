//! `$key` variable expansion.
//!
//! Matching is longest-key-first: when both `env` and `environment` are
//! defined, `$environment` always resolves to `environment`. Substituted
//! values are inserted literally and never rescanned. Tokens that match no
//! key are left verbatim.

/// Expands `$key` references against a fixed set of variables.
#[derive(Debug, Clone, Default)]
pub struct Expander<'a> {
    /// Sorted by key length (descending), then lexicographically.
    vars: Vec<(&'a str, &'a str)>,
}

impl<'a> Expander<'a> {
    /// Build an expander from `(key, value)` pairs. Empty keys are ignored.
    pub fn new<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut vars: Vec<_> = vars.into_iter().filter(|(k, _)| !k.is_empty()).collect();
        vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        Self { vars }
    }

    /// Expand every `$key` occurrence in `expr`.
    pub fn expand(&self, expr: &str) -> String {
        if !expr.contains('$') {
            return expr.to_string();
        }

        let mut out = String::with_capacity(expr.len());
        let mut rest = expr;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            match self.longest_match(after) {
                Some((key, value)) => {
                    out.push_str(value);
                    rest = &after[key.len()..];
                }
                None => {
                    out.push('$');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }

    fn longest_match(&self, text: &str) -> Option<(&'a str, &'a str)> {
        self.vars.iter().copied().find(|(key, _)| text.starts_with(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_keys() {
        let expander = Expander::new([("env", "a"), ("env2", "b")]);
        assert_eq!(expander.expand("$env/$env2"), "a/b");
    }

    #[test]
    fn test_unknown_left_verbatim() {
        let expander = Expander::new([("env", "a")]);
        assert_eq!(expander.expand("$unknown/x"), "$unknown/x");
        assert_eq!(expander.expand("cost$"), "cost$");
    }

    #[test]
    fn test_prefix_key_does_not_shadow_longer_key() {
        let expander = Expander::new([("env", "short"), ("environment", "long")]);
        assert_eq!(expander.expand("$environment"), "long");
        assert_eq!(expander.expand("$env"), "short");
        // longest match wins even when followed by more word characters
        assert_eq!(expander.expand("$environments"), "longs");
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let a = Expander::new([("environment", "long"), ("env", "short")]);
        let b = Expander::new([("env", "short"), ("environment", "long")]);
        assert_eq!(a.expand("$environment-$env"), b.expand("$environment-$env"));
    }

    #[test]
    fn test_repeated_occurrences() {
        let expander = Expander::new([("role", "web")]);
        assert_eq!(expander.expand("$role/$role.policy"), "web/web.policy");
    }

    #[test]
    fn test_values_not_rescanned() {
        let expander = Expander::new([("a", "$b"), ("b", "x")]);
        assert_eq!(expander.expand("$a"), "$b");
    }

    #[test]
    fn test_no_dollar_fast_path() {
        let expander = Expander::new([("a", "b")]);
        assert_eq!(expander.expand("plain"), "plain");
    }

    #[test]
    fn test_empty_key_ignored() {
        let expander = Expander::new([("", "oops")]);
        assert_eq!(expander.expand("$x"), "$x");
    }
}
