//! Helpers for turning free-text search input into match criteria.

/// Maximum number of digits taken from a numeric run.
const MAX_NUMERIC_LEN: usize = 4;

/// Returns the run of ASCII letters at the start of `text`, ignoring leading
/// whitespace. Returns `None` when the first non-whitespace character is not
/// a letter.
pub fn first_alphabetic_substring(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());

    if end == 0 { None } else { Some(&trimmed[..end]) }
}

/// Returns the first run of ASCII digits anywhere in `text`, truncated to
/// four digits.
pub fn first_numeric_substring(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len())
        .min(MAX_NUMERIC_LEN);

    Some(&rest[..len])
}

/// Splits a query into whitespace-delimited tokens, collapsing repeated
/// whitespace.
pub fn query_tokens(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Canonical form of a term code: trimmed and upper-cased ("sp24" -> "SP24").
pub fn normalize_term(term: &str) -> String {
    term.trim().to_ascii_uppercase()
}

/// Builds a `LIKE '%needle%'` pattern that matches `needle` literally.
/// Pair with `ESCAPE '\'` in the SQL.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
