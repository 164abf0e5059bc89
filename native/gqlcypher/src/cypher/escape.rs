/// Identifier escaping for labels, relationship types and property keys.
///
/// Identifiers are the only schema- or context-derived strings that are ever
/// written into Cypher text directly; values always travel as parameters.
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Words that must be quoted even though they are syntactically plain identifiers
static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ALL", "AND", "AS", "ASC", "ASCENDING", "BY", "CALL", "CASE", "CONTAINS", "CREATE",
        "DELETE", "DESC", "DESCENDING", "DETACH", "DISTINCT", "ELSE", "END", "ENDS", "EXISTS",
        "FALSE", "FOREACH", "IN", "IS", "LIMIT", "MATCH", "MERGE", "NOT", "NULL", "ON",
        "OPTIONAL", "OR", "ORDER", "REMOVE", "RETURN", "SET", "SKIP", "STARTS", "THEN", "TRUE",
        "UNION", "UNWIND", "WHEN", "WHERE", "WITH", "XOR", "YIELD",
    ]
    .into_iter()
    .collect()
});

#[inline]
fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.contains(name.to_ascii_uppercase().as_str())
}

/// Escapes an identifier with backticks when it is not a plain identifier.
///
/// Embedded backticks are doubled, so the result is always a single token.
pub fn escape_identifier(name: &str) -> String {
    if is_plain(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Escapes a string literal for single-quoted Cypher strings
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_are_untouched() {
        assert_eq!(escape_identifier("Movie"), "Movie");
        assert_eq!(escape_identifier("_private1"), "_private1");
    }

    #[test]
    fn identifiers_with_metacharacters_are_quoted() {
        assert_eq!(escape_identifier("My Label"), "`My Label`");
        assert_eq!(escape_identifier("a`b"), "`a``b`");
        assert_eq!(escape_identifier("1abc"), "`1abc`");
    }

    #[test]
    fn reserved_words_are_quoted() {
        assert_eq!(escape_identifier("match"), "`match`");
        assert_eq!(escape_identifier("Order"), "`Order`");
    }

    #[test]
    fn string_literals_escape_quotes() {
        assert_eq!(escape_string("it's"), "'it\\'s'");
        assert_eq!(escape_string("a\\b"), "'a\\\\b'");
    }
}
