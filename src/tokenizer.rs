//! Term normalization shared by the BM25 index and the hashing embedder.
//!
//! Text is case-folded, every character that is not a Unicode letter, digit
//! or whitespace becomes a space, and the result is split on whitespace.
//! Common English function words are dropped unless disabled.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\p{L}\p{N}\s]").expect("valid non-word pattern")
});

/// Closed list of English function words removed from term streams.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in",
    "into", "is", "it", "no", "not", "of", "on", "or", "such", "that", "the",
    "their", "then", "there", "these", "they", "this", "to", "was", "will",
    "with",
];

/// Switches for [`tokenize`]. Both are on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizeOptions {
    pub lowercase: bool,
    pub remove_stopwords: bool,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: true,
        }
    }
}

pub fn is_stopword(term: &str) -> bool {
    STOPWORDS.contains(&term)
}

/// Split text into normalized terms.
///
/// # Examples
///
/// ```
/// use docsift::tokenizer::{tokenize, TokenizeOptions};
///
/// let terms = tokenize("The cat sat on the mat.", TokenizeOptions::default());
/// assert_eq!(terms, vec!["cat", "sat", "mat"]);
/// ```
pub fn tokenize(text: &str, options: TokenizeOptions) -> Vec<String> {
    let folded = if options.lowercase {
        text.to_lowercase()
    } else {
        text.to_string()
    };
    let cleaned = NON_WORD.replace_all(&folded, " ");

    cleaned
        .split_whitespace()
        .filter(|term| !(options.remove_stopwords && is_stopword(term)))
        .map(str::to_string)
        .collect()
}
