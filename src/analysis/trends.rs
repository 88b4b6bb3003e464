//! Cross-run trend analysis for watched topics.
//!
//! Each completed run is compared against a rolling window of the task's
//! recent successful runs: per-keyword frequency trends, activity level,
//! sentiment shift, topic evolution, and anomaly detection. The analyzer is
//! pure; the executor loads the window and persists the outcome.

use std::collections::{BTreeMap, BTreeSet};

use crate::store::types::{
    HistoryRecord, TopicEvolution, TrendRecord, WatchTask, new_id, now_epoch_secs,
};

use super::keywords::{keyword_frequency, top_terms};
use super::sentiment;

/// Per-keyword trend magnitude beyond which the run is anomalous.
pub const KEYWORD_ANOMALY_BOUND: f64 = 5.0;
/// Activity level above which the run is anomalous.
pub const ACTIVITY_ANOMALY_BOUND: f64 = 8.0;
/// Keyword trend above which a keyword counts as emerging.
const EMERGING_TREND_BOUND: f64 = 1.0;
/// Activity reported when there is no window to compare against.
const NEUTRAL_ACTIVITY: f64 = 5.0;
/// Confidence reported until a task has comparable history.
const COLD_START_CONFIDENCE: f64 = 0.3;
/// Number of prominent terms tracked for topic evolution.
const PROMINENT_TERMS: usize = 10;

/// Everything the executor needs after analyzing one run.
#[derive(Debug, Clone)]
pub struct TrendOutcome {
    /// Row destined for the trends table.
    pub record: TrendRecord,
    /// Mean of the per-keyword trends; recorded on the history row.
    pub trend_score: f64,
    /// Absolute sentiment of the run's report; recorded on the history row.
    pub sentiment_score: f64,
}

/// Compares one run against a rolling window of prior successful runs.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    window: usize,
}

impl TrendAnalyzer {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// Size of the comparison window.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Analyze one run's report against the task's prior successful runs.
    ///
    /// `prior` must be ordered newest-first, as
    /// [`WatchStore::recent_successes`] returns it; records beyond the
    /// configured window are ignored. With fewer than two comparable runs
    /// every delta is zero and the outcome is a low-confidence baseline, so
    /// a task's first firing never trips a notification.
    ///
    /// [`WatchStore::recent_successes`]: crate::store::WatchStore::recent_successes
    pub fn analyze(
        &self,
        task: &WatchTask,
        report_text: &str,
        sources_count: u32,
        prior: &[HistoryRecord],
    ) -> TrendOutcome {
        let window = &prior[..prior.len().min(self.window)];
        let sentiment_score = sentiment::score(report_text);

        if window.len() < 2 {
            return baseline_outcome(task, report_text, sentiment_score);
        }

        let count = window.len() as f64;

        let mut keyword_trends = BTreeMap::new();
        for keyword in &task.keywords {
            let current = keyword_frequency(report_text, keyword) as f64;
            let mean = window
                .iter()
                .map(|run| keyword_frequency(&run.report_text, keyword) as f64)
                .sum::<f64>()
                / count;
            keyword_trends.insert(keyword.clone(), (current - mean) / mean.max(1.0));
        }

        let trend_score = mean_of(keyword_trends.values().copied());
        let change_magnitude = mean_of(keyword_trends.values().map(|t| t.abs()));

        let current_words = word_count(report_text);
        let mean_words =
            window.iter().map(|run| word_count(&run.report_text)).sum::<f64>() / count;
        let mean_sources =
            window.iter().map(|run| f64::from(run.sources_count)).sum::<f64>() / count;
        let word_ratio = current_words / mean_words.max(1.0);
        let source_ratio = f64::from(sources_count) / mean_sources.max(1.0);
        let activity_level =
            (NEUTRAL_ACTIVITY * (word_ratio + source_ratio) / 2.0).clamp(0.0, 10.0);

        let mean_sentiment =
            window.iter().map(|run| sentiment::score(&run.report_text)).sum::<f64>() / count;
        let sentiment_change = sentiment_score - mean_sentiment;

        let current_terms = top_terms(report_text, PROMINENT_TERMS);
        let current_set: BTreeSet<&str> = current_terms.iter().map(String::as_str).collect();
        let mut window_terms: BTreeSet<String> = BTreeSet::new();
        for run in window {
            window_terms.extend(top_terms(&run.report_text, PROMINENT_TERMS));
        }
        let appeared: Vec<String> = current_terms
            .iter()
            .filter(|term| !window_terms.contains(*term))
            .cloned()
            .collect();
        let disappeared: Vec<String> = window_terms
            .iter()
            .filter(|term| !current_set.contains(term.as_str()))
            .cloned()
            .collect();
        let persistent: Vec<String> = current_terms
            .iter()
            .filter(|term| window_terms.contains(*term))
            .cloned()
            .collect();
        let evolution_rate = appeared.len() as f64 / current_terms.len().max(1) as f64;
        let new_topics = appeared.clone();

        let emerging_keywords: Vec<String> = keyword_trends
            .iter()
            .filter(|(_, trend)| **trend > EMERGING_TREND_BOUND)
            .map(|(keyword, _)| keyword.clone())
            .collect();

        let mut anomalies = Vec::new();
        for (keyword, trend) in &keyword_trends {
            if trend.abs() > KEYWORD_ANOMALY_BOUND {
                anomalies.push(format!(
                    "keyword '{keyword}' trend {trend:+.1} beyond ±{KEYWORD_ANOMALY_BOUND:.1}"
                ));
            }
        }
        if activity_level > ACTIVITY_ANOMALY_BOUND {
            anomalies.push(format!(
                "activity level {activity_level:.1} above {ACTIVITY_ANOMALY_BOUND:.1}"
            ));
        }
        let anomaly_detected = !anomalies.is_empty();
        let anomaly_description = anomaly_detected.then(|| anomalies.join("; "));

        let history_factor = (count / 10.0).min(1.0);
        let volume_factor =
            ((current_words / 1000.0 + f64::from(sources_count) / 10.0) / 2.0).min(1.0);
        let confidence_score = 0.6 * history_factor + 0.4 * volume_factor;

        let record = TrendRecord {
            id: new_id("trend"),
            task_id: task.id.clone(),
            analyzed_at: now_epoch_secs(),
            keyword_trends,
            sentiment_change,
            topic_evolution: TopicEvolution {
                appeared,
                disappeared,
                persistent,
                evolution_rate,
            },
            new_topics,
            emerging_keywords,
            activity_level,
            change_magnitude,
            confidence_score,
            anomaly_detected,
            anomaly_description,
        };

        TrendOutcome {
            record,
            trend_score,
            sentiment_score,
        }
    }
}

/// Outcome for a task without enough history to compare against.
fn baseline_outcome(task: &WatchTask, report_text: &str, sentiment_score: f64) -> TrendOutcome {
    let appeared = top_terms(report_text, PROMINENT_TERMS);
    let evolution_rate = if appeared.is_empty() { 0.0 } else { 1.0 };
    let keyword_trends: BTreeMap<String, f64> =
        task.keywords.iter().map(|keyword| (keyword.clone(), 0.0)).collect();

    let record = TrendRecord {
        id: new_id("trend"),
        task_id: task.id.clone(),
        analyzed_at: now_epoch_secs(),
        keyword_trends,
        sentiment_change: 0.0,
        topic_evolution: TopicEvolution {
            appeared: appeared.clone(),
            disappeared: Vec::new(),
            persistent: Vec::new(),
            evolution_rate,
        },
        new_topics: appeared,
        emerging_keywords: Vec::new(),
        activity_level: NEUTRAL_ACTIVITY,
        change_magnitude: 0.0,
        confidence_score: COLD_START_CONFIDENCE,
        anomaly_detected: false,
        anomaly_description: None,
    };

    TrendOutcome {
        record,
        trend_score: 0.0,
        sentiment_score,
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn word_count(text: &str) -> f64 {
    text.split_whitespace().count() as f64
}
