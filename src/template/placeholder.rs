//! `${expr}` placeholder handling.

use std::sync::LazyLock;

use regex::Regex;

/// Matches a single `${...}` placeholder.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{[^}]+\}").expect("valid placeholder pattern"));

/// Expressions with this prefix address the client-only model.
const CLIENT_PREFIX: &str = "model.";

#[inline]
pub fn contains_placeholder(s: &str) -> bool {
    PLACEHOLDER.is_match(s)
}

/// All placeholder expressions in `s`, in order of appearance.
pub fn expressions(s: &str) -> Vec<&str> {
    PLACEHOLDER
        .find_iter(s)
        .map(|m| &s[m.start() + 2..m.end() - 1])
        .collect()
}

/// Server-side references in `s` (client-only expressions excluded).
pub fn references(s: &str) -> Vec<String> {
    expressions(s)
        .into_iter()
        .filter(|expr| !is_client_only(expr))
        .map(str::to_string)
        .collect()
}

#[inline]
pub fn is_client_only(expr: &str) -> bool {
    expr.starts_with(CLIENT_PREFIX)
}

/// Rewrite `${` to `{` for the client-side formatter.
#[inline]
pub fn normalize(s: &str) -> String {
    s.replace("${", "{")
}

/// The expression if `text` is exactly one placeholder, ignoring
/// surrounding whitespace.
pub fn sole_expression(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let m = PLACEHOLDER.find(trimmed)?;
    (m.start() == 0 && m.end() == trimmed.len()).then(|| &trimmed[2..trimmed.len() - 1])
}
