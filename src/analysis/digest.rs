//! Digest extraction for one run: a summary line, key findings pulled from
//! the report, and key changes derived from the trend analysis.

use crate::store::types::TrendRecord;

/// Characters of report excerpt appended to the summary headline.
const SUMMARY_EXCERPT_CHARS: usize = 300;
/// Shortest paragraph considered for the summary excerpt.
const EXCERPT_MIN_CHARS: usize = 50;
/// Paragraph length range accepted as a key finding.
const FINDING_MIN_CHARS: usize = 40;
const FINDING_MAX_CHARS: usize = 400;
const KEY_FINDINGS_MAX: usize = 4;
const KEY_CHANGES_MAX: usize = 3;

/// Terms that mark a paragraph as reporting something, not filler.
const SIGNAL_TERMS: &[&str] = &[
    "announced",
    "breakthrough",
    "critical",
    "decrease",
    "developed",
    "discovered",
    "first",
    "growth",
    "important",
    "increase",
    "key",
    "launched",
    "major",
    "new",
    "notable",
    "significant",
];

/// Human-facing digest of one run, stored on its history row.
#[derive(Debug, Clone)]
pub struct RunDigest {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub key_changes: Vec<String>,
}

/// Build the digest for a run from its report and trend outcome.
pub fn build(topic: &str, report_text: &str, record: &TrendRecord, trend_score: f64) -> RunDigest {
    RunDigest {
        summary: summary(topic, report_text, record, trend_score),
        key_findings: key_findings(report_text),
        key_changes: key_changes(record),
    }
}

fn summary(topic: &str, report_text: &str, record: &TrendRecord, trend_score: f64) -> String {
    let head = headline(topic, record, trend_score);
    match first_excerpt(report_text) {
        Some(excerpt) => format!("{head}. {excerpt}"),
        None => head,
    }
}

fn headline(topic: &str, record: &TrendRecord, trend_score: f64) -> String {
    if record.anomaly_detected {
        format!("Anomalous change detected for {topic}")
    } else if trend_score > 1.0 {
        format!("Rising activity around {topic}")
    } else if trend_score < -1.0 {
        format!("Declining activity around {topic}")
    } else if record.topic_evolution.appeared.len() > 3 {
        format!("New topics emerging around {topic}")
    } else {
        format!("Steady coverage of {topic}")
    }
}

/// First substantial paragraph, flattened and cut to the excerpt budget.
fn first_excerpt(report_text: &str) -> Option<String> {
    paragraphs(report_text)
        .into_iter()
        .find(|p| p.chars().count() >= EXCERPT_MIN_CHARS)
        .map(|p| truncate_on_word(&p, SUMMARY_EXCERPT_CHARS))
}

fn key_findings(report_text: &str) -> Vec<String> {
    let candidates = paragraphs(report_text);
    let mut findings: Vec<String> = candidates
        .iter()
        .filter(|p| {
            let len = p.chars().count();
            if !(FINDING_MIN_CHARS..=FINDING_MAX_CHARS).contains(&len) {
                return false;
            }
            let lowered = p.to_lowercase();
            SIGNAL_TERMS.iter().any(|term| lowered.contains(term))
        })
        .take(KEY_FINDINGS_MAX)
        .cloned()
        .collect();

    if findings.is_empty() {
        if let Some(first) = candidates
            .into_iter()
            .find(|p| p.chars().count() >= FINDING_MIN_CHARS)
        {
            findings.push(truncate_on_word(&first, FINDING_MAX_CHARS));
        }
    }
    findings
}

fn key_changes(record: &TrendRecord) -> Vec<String> {
    let mut changes = Vec::new();

    for (keyword, trend) in &record.keyword_trends {
        if *trend > 1.0 {
            changes.push(format!("'{keyword}' mentions rising ({trend:+.1})"));
        } else if *trend < -1.0 {
            changes.push(format!("'{keyword}' mentions falling ({trend:+.1})"));
        }
    }

    if record.sentiment_change.abs() > 0.1 {
        let direction = if record.sentiment_change > 0.0 {
            "positive"
        } else {
            "negative"
        };
        changes.push(format!(
            "sentiment shifted {direction} ({:+.2})",
            record.sentiment_change
        ));
    }

    if !record.topic_evolution.appeared.is_empty() {
        let shown: Vec<&str> = record
            .topic_evolution
            .appeared
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        changes.push(format!("new topics: {}", shown.join(", ")));
    }

    if record.activity_level >= 8.0 {
        changes.push(format!(
            "activity well above recent baseline ({:.1})",
            record.activity_level
        ));
    } else if record.activity_level <= 2.0 {
        changes.push(format!(
            "activity well below recent baseline ({:.1})",
            record.activity_level
        ));
    }

    changes.truncate(KEY_CHANGES_MAX);
    changes
}

/// Non-empty paragraphs with internal whitespace flattened to single spaces.
fn paragraphs(report_text: &str) -> Vec<String> {
    report_text
        .split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect()
}

fn truncate_on_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out = String::new();
    let mut used = 0usize;
    for word in text.split_whitespace() {
        let word_chars = word.chars().count();
        let needed = word_chars + usize::from(!out.is_empty());
        if used + needed > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        used += needed;
    }
    out.push_str("...");
    out
}
