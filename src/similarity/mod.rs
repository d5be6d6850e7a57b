//! Tokenization and set-overlap similarity.
//!
//! Text is reduced to a set of lowercase word tokens. Near-duplicate
//! detection compares token sets with the Jaccard index; search scoring
//! counts how many query tokens occur in a record's content and tags.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Tokens shorter than this are ignored.
const MIN_TOKEN_CHARS: usize = 2;

#[allow(clippy::expect_used)]
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("static regex"));

/// A normalized set of word tokens.
pub type TokenSet = HashSet<String>;

/// Splits text into lowercase alphanumeric tokens.
///
/// Punctuation separates tokens, so `Next.js` yields `next` and `js`.
#[must_use]
pub fn tokenize(text: &str) -> TokenSet {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Tokenizes every tag into one combined set.
#[must_use]
pub fn tokenize_all<'a>(texts: impl IntoIterator<Item = &'a str>) -> TokenSet {
    texts.into_iter().flat_map(tokenize).collect()
}

/// Jaccard index `|a ∩ b| / |a ∪ b|`; zero when both sets are empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard(a: &TokenSet, b: &TokenSet) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// Jaccard similarity of two raw strings.
#[must_use]
pub fn text_similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

/// Number of `query` tokens present in `target`.
#[must_use]
pub fn overlap_count(query: &TokenSet, target: &TokenSet) -> usize {
    query.iter().filter(|t| target.contains(*t)).count()
}
