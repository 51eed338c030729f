//! SQL identifier helpers: dequoting and `LIKE` pattern translation

use crate::{Error, Result};
use regex::Regex;

/// Whitespace as understood by C `isspace` (includes vertical tab and form feed)
pub(crate) fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

/// Strip surrounding whitespace and one pair of matching quotes.
///
/// Returns the resulting text and whether dequoting succeeded. An opening
/// `'`, `"` or `` ` `` without the same character at the end is a mismatch:
/// the whitespace-trimmed text is returned with its quotes intact and `false`.
/// A lone quote character serves as both ends and yields an empty identifier.
///
/// ```
/// use proxy_backend::identifier::trim_quotes;
///
/// assert_eq!(trim_quotes("  `db1`  "), ("db1", true));
/// assert_eq!(trim_quotes("'abc"), ("'abc", false));
/// assert_eq!(trim_quotes("abc"), ("abc", true));
/// ```
pub fn trim_quotes(text: &str) -> (&str, bool) {
    let trimmed = text.trim_matches(is_space);

    let quote = match trimmed.chars().next() {
        Some(c @ ('\'' | '"' | '`')) => c,
        _ => return (trimmed, true),
    };

    let inner = &trimmed[quote.len_utf8()..];
    if inner.is_empty() {
        return (inner, true);
    }
    match inner.strip_suffix(quote) {
        Some(unquoted) => (unquoted, true),
        None => (trimmed, false),
    }
}

/// How `%` is translated by [`pattern_to_matcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildcardMode {
    /// `%` becomes `.*`
    Wildcard,
    /// `%` is kept as a literal character
    Verbatim,
}

/// Result of translating a `LIKE` pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherPattern {
    /// Regex source, unanchored
    pub pattern: String,
    /// Whether the input contained `%`
    pub has_wildcard: bool,
}

const REGEX_META: &[char] = &[
    '\'', '^', '.', '$', '|', '(', ')', '[', ']', '*', '+', '?', '{', '}',
];

/// Translate an identifier pattern into regex source.
///
/// Regex metacharacters are escaped with `\`. `%` is reported through
/// `has_wildcard` in both modes and becomes `.*` in [`WildcardMode::Wildcard`].
/// `_` is passed through unchanged.
pub fn pattern_to_matcher(pattern: &str, mode: WildcardMode) -> MatcherPattern {
    // Every input character yields at most two output characters
    let capacity = 2 * pattern.len();
    let mut out = String::with_capacity(capacity);
    let mut has_wildcard = false;

    for c in pattern.chars() {
        match c {
            '%' => {
                has_wildcard = true;
                match mode {
                    WildcardMode::Wildcard => out.push_str(".*"),
                    WildcardMode::Verbatim => out.push('%'),
                }
            }
            c if REGEX_META.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }

    debug_assert!(out.len() <= capacity);

    MatcherPattern {
        pattern: out,
        has_wildcard,
    }
}

/// Compile an identifier pattern into a regex matching the whole identifier
pub fn compile_matcher(pattern: &str) -> Result<Regex> {
    let translated = pattern_to_matcher(pattern, WildcardMode::Wildcard);
    Regex::new(&format!("^(?:{})$", translated.pattern))
        .map_err(|e| Error::Config(format!("invalid identifier pattern '{}': {}", pattern, e)))
}
