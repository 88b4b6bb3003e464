//! Lexicon-based sentiment scoring for research reports.
//!
//! Reports are compared against small polarity lexicons and reduced to a
//! single score in `-1.0..=1.0`. Neutral hits damp the score toward zero
//! without flipping its sign.

use super::keywords::tokenize;

// ── Positive ─────────────────────────────────────────────────────────────

const POSITIVE: &[&str] = &[
    "advance",
    "advances",
    "breakthrough",
    "breakthroughs",
    "gain",
    "gains",
    "grew",
    "growing",
    "growth",
    "improve",
    "improved",
    "improvement",
    "improvements",
    "innovation",
    "innovative",
    "positive",
    "progress",
    "rise",
    "rising",
    "success",
    "successful",
    "surge",
];

// ── Negative ─────────────────────────────────────────────────────────────

const NEGATIVE: &[&str] = &[
    "challenge",
    "challenges",
    "concern",
    "concerns",
    "crisis",
    "decline",
    "declined",
    "declining",
    "decrease",
    "decreased",
    "drop",
    "dropped",
    "fail",
    "failed",
    "failure",
    "failures",
    "loss",
    "losses",
    "negative",
    "problem",
    "problems",
    "risk",
    "risks",
    "setback",
];

// ── Neutral ──────────────────────────────────────────────────────────────

const NEUTRAL: &[&str] = &[
    "consistent",
    "flat",
    "maintain",
    "maintained",
    "moderate",
    "neutral",
    "ongoing",
    "plateau",
    "stable",
    "steady",
    "unchanged",
];

/// Sentiment of `text` in `-1.0..=1.0`.
///
/// Computed as `(positive - negative) / (positive + negative + neutral)`
/// over lexicon hits. Text with no hits at all scores `0.0`.
pub fn score(text: &str) -> f64 {
    let mut positive = 0u64;
    let mut negative = 0u64;
    let mut neutral = 0u64;

    for token in tokenize(text) {
        let token = token.as_str();
        if POSITIVE.contains(&token) {
            positive += 1;
        } else if NEGATIVE.contains(&token) {
            negative += 1;
        } else if NEUTRAL.contains(&token) {
            neutral += 1;
        }
    }

    let total = positive + negative + neutral;
    if total == 0 {
        return 0.0;
    }
    (positive as f64 - negative as f64) / total as f64
}
