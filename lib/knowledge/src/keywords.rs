//! Keyword extraction for knowledge base lookups.

/// Characters that separate candidate keywords.
const SEPARATORS: [char; 7] = [' ', ',', '.', ':', ';', '\n', '\t'];

/// Tokens of this many characters or fewer are dropped.
const MIN_EXCLUSIVE_LEN: usize = 2;

/// At most this many candidates are produced.
const MAX_KEYWORDS: usize = 10;

/// Splits free text into lookup candidates.
///
/// Tokens keep their original case and order; matching against records is
/// case-insensitive, so no folding happens here.
#[must_use]
pub fn extract_keywords(text: &str) -> Vec<String> {
    text.split(SEPARATORS)
        .filter(|token| token.chars().count() > MIN_EXCLUSIVE_LEN)
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}
