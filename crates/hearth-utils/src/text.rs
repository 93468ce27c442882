//! Small text helpers shared by the analyzer, rewriter and formatter.

/// Lower-case and trim, the normalization step every matcher in `spec.md §4.2`
/// starts from ("Lower-case the utterance").
#[must_use]
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Whitespace-delimited token count, used by the rewriter's "≤ 3 tokens" trigger
/// and the scope detector's length heuristic (`spec.md §4.3`, §4.4 rule 9).
#[must_use]
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().filter(|t| !t.is_empty()).count()
}

/// Whether `text` looks like "garbage" input per `spec.md §4.1`'s routing
/// predicate: empty, shorter than 3 chars, digits-only, no letters at all, or a
/// known garbage token.
#[must_use]
pub fn is_problematic_query(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().count() < 3 {
        return true;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if !trimmed.chars().any(char::is_alphabetic) {
        return true;
    }
    let lower = trimmed.to_lowercase();
    const GARBAGE_TOKENS: [&str; 5] = ["qwerty", "xyz", "12345", "test123", "asdf"];
    GARBAGE_TOKENS.iter().any(|token| lower.contains(token))
}

/// Substring containment check done against a lower-cased haystack; the
/// pattern tables everywhere in this workspace match this way (`spec.md §4.2`:
/// "substring matches on word-ish tokens").
#[must_use]
pub fn contains_pattern(haystack_lower: &str, pattern: &str) -> bool {
    haystack_lower.contains(&pattern.to_lowercase())
}
