//! Tokenizer and keyword frequency counting over report text.
//!
//! Frequencies are token-based, not substring-based, so a tracked keyword
//! like "AI" never matches inside "air". Multi-word keywords are counted as
//! token sequences.

use std::collections::HashMap;

/// Lowercase word tokens, keeping apostrophes and hyphens inside words.
/// Single-character fragments are dropped.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '\'' || ch == '-' {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            if current.chars().count() > 1 {
                tokens.push(current.clone());
            }
            current.clear();
        }
    }
    if !current.is_empty() && current.chars().count() > 1 {
        tokens.push(current);
    }

    tokens
}

/// Occurrences of `keyword` in `text`, case-insensitive.
///
/// A multi-word keyword matches as a contiguous token sequence.
pub fn keyword_frequency(text: &str, keyword: &str) -> u64 {
    let needle = tokenize(keyword);
    if needle.is_empty() {
        return 0;
    }
    let haystack = tokenize(text);
    if haystack.len() < needle.len() {
        return 0;
    }

    haystack
        .windows(needle.len())
        .filter(|window| *window == needle.as_slice())
        .count() as u64
}

// Function words that would otherwise dominate any frequency ranking.
const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "between", "both", "could", "does",
    "during", "each", "from", "have", "however", "into", "many", "more", "most", "much", "other",
    "over", "several", "should", "some", "such", "than", "that", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "under", "very", "were", "what", "when", "where",
    "which", "while", "will", "with", "within", "would",
];

/// The `k` most frequent substantial terms in `text`, most frequent first.
///
/// Terms shorter than four characters and stop words are skipped; ties break
/// alphabetically so the ranking is deterministic.
pub fn top_terms(text: &str, k: usize) -> Vec<String> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for token in tokenize(text) {
        if token.chars().count() < 4 || STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(k).map(|(term, _)| term).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Large-scale AI; it's here!"),
            vec!["large-scale", "ai", "it's", "here"]
        );
    }

    #[test]
    fn tokenize_drops_single_characters() {
        assert_eq!(tokenize("a b model I"), vec!["model"]);
    }

    #[test]
    fn frequency_is_case_insensitive() {
        let text = "AI is everywhere. ai models and more Ai.";
        assert_eq!(keyword_frequency(text, "AI"), 3);
    }

    #[test]
    fn frequency_does_not_match_inside_words() {
        let text = "the air in the hair is not aiming at ai";
        assert_eq!(keyword_frequency(text, "ai"), 1);
    }

    #[test]
    fn frequency_counts_multi_word_keywords() {
        let text = "Machine learning grows. machine learning wins; learning machines differ.";
        assert_eq!(keyword_frequency(text, "machine learning"), 2);
    }

    #[test]
    fn frequency_of_empty_keyword_is_zero() {
        assert_eq!(keyword_frequency("some text", "  "), 0);
    }

    #[test]
    fn top_terms_ranked_by_frequency() {
        let text = "quantum quantum quantum computing computing sensors";
        assert_eq!(
            top_terms(text, 2),
            vec!["quantum".to_owned(), "computing".to_owned()]
        );
    }

    #[test]
    fn top_terms_skip_stop_words_and_short_tokens() {
        let text = "that that that this this gpu gpu chips chips chips";
        let terms = top_terms(text, 10);
        assert_eq!(terms, vec!["chips".to_owned()]);
    }

    #[test]
    fn top_terms_tie_break_is_alphabetical() {
        let text = "alpha beta";
        assert_eq!(top_terms(text, 2), vec!["alpha".to_owned(), "beta".to_owned()]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(top_terms("", 5).is_empty());
        assert_eq!(keyword_frequency("", "ai"), 0);
    }
}
