// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Text normalization and set-overlap similarity
//!
//! Both the deduplication engine and the relevance/pattern engines reduce
//! free text to token sets and compare them with Jaccard overlap. The two
//! entry points differ only in their empty-set conventions:
//!
//! - [`token_similarity`]: two empty strings are identical (1.0), one empty
//!   string is unrelated (0.0).
//! - [`keyword_similarity`]: an empty keyword set on either side scores 0.0,
//!   since there is nothing to rank by.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"));

/// Words too common to carry relevance signal.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
        "if", "in", "into", "is", "it", "its", "of", "on", "or", "our", "so", "that", "the",
        "their", "then", "there", "these", "they", "this", "to", "use", "was", "we", "were",
        "when", "which", "will", "with", "you",
    ]
    .into_iter()
    .collect()
});

/// Lowercase, strip punctuation, split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, " ");
    stripped
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Deduplicated token set of a text.
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Token set with stop words removed, used for relevance scoring.
pub fn keyword_set(text: &str) -> HashSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !STOP_WORDS.contains(t.as_str()))
        .collect()
}

/// Jaccard overlap |a ∩ b| / |a ∪ b| over two token sets.
///
/// Two empty sets are defined as identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Similarity of two raw texts over their full token sets.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    jaccard(&token_set(a), &token_set(b))
}

/// Similarity of two texts over stop-word-filtered keywords.
///
/// Scores 0.0 when either side yields no keywords.
pub fn keyword_similarity(a: &str, b: &str) -> f64 {
    let ka = keyword_set(a);
    let kb = keyword_set(b);
    if ka.is_empty() || kb.is_empty() {
        return 0.0;
    }
    jaccard(&ka, &kb)
}

/// Rough token count of a text at ~4 characters per token.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.len().div_ceil(chars_per_token.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation_and_lowercases() {
        assert_eq!(
            tokenize("Use library-X, for Feature Y!"),
            vec!["use", "library", "x", "for", "feature", "y"]
        );
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = "use postgres for persistence";
        let b = "persistence should use postgres";
        assert_eq!(token_similarity(a, b), token_similarity(b, a));
    }

    #[test]
    fn test_identical_text_scores_one() {
        assert_eq!(token_similarity("retry with backoff", "retry with backoff"), 1.0);
    }

    #[test]
    fn test_empty_conventions() {
        assert_eq!(token_similarity("", ""), 1.0);
        assert_eq!(token_similarity("a", ""), 0.0);
        assert_eq!(token_similarity("", "a"), 0.0);
        // Keyword similarity never treats empties as a match.
        assert_eq!(keyword_similarity("", ""), 0.0);
        assert_eq!(keyword_similarity("the and of", "postgres"), 0.0);
    }

    #[test]
    fn test_stop_words_filtered_from_keywords() {
        let keywords = keyword_set("the team will use postgres for the cache");
        assert!(keywords.contains("postgres"));
        assert!(keywords.contains("cache"));
        assert!(!keywords.contains("the"));
        assert!(!keywords.contains("will"));
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("abcd", 4), 1);
        assert_eq!(estimate_tokens("abcde", 4), 2);
        assert_eq!(estimate_tokens("", 4), 0);
    }
}
