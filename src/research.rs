//! Research engine boundary: the external collaborator that executes
//! queries and writes reports.
//!
//! The core only contracts on the engine's async, timeout-cancellable
//! shape. A conforming engine checkpoints its context as it works: when the
//! cancellation token fires mid-research it returns `Ok` with whatever it
//! has gathered so far (`complete = false`) instead of discarding it, which
//! is what lets a timed-out run still produce a partial report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::store::types::{AnalysisDepth, WatchTask};

// ---------------------------------------------------------------------------
// Tier tables
// ---------------------------------------------------------------------------

/// Standard research timeouts per tier, in seconds.
const STANDARD_TIMEOUT_SECS: [(AnalysisDepth, u64); 3] = [
    (AnalysisDepth::Basic, 120),
    (AnalysisDepth::Detailed, 300),
    (AnalysisDepth::Deep, 600),
];

/// Quick-mode research timeouts per tier, in seconds.
const QUICK_TIMEOUT_SECS: [(AnalysisDepth, u64); 3] = [
    (AnalysisDepth::Basic, 60),
    (AnalysisDepth::Detailed, 120),
    (AnalysisDepth::Deep, 180),
];

/// Report synthesis budget for standard runs, in seconds.
pub const STANDARD_REPORT_TIMEOUT_SECS: u64 = 60;

/// Report synthesis budget for quick runs, in seconds.
pub const QUICK_REPORT_TIMEOUT_SECS: u64 = 30;

fn timeout_for(depth: AnalysisDepth, table: &[(AnalysisDepth, u64); 3]) -> u64 {
    table
        .iter()
        .find(|(d, _)| *d == depth)
        .map(|(_, secs)| *secs)
        .unwrap_or(table[0].1)
}

/// The resolved configuration for one research run. Stored verbatim in the
/// run's history row so any result can be reproduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchJobConfig {
    pub depth: AnalysisDepth,
    pub quick: bool,
    /// Search results fetched per sub-query.
    pub max_search_results: u32,
    pub subtopics: u32,
    pub iterations: u32,
    pub target_words: u32,
    pub timeout_secs: u64,
    pub report_timeout_secs: u64,
}

impl ResearchJobConfig {
    /// Standard tier table.
    pub fn standard(depth: AnalysisDepth) -> Self {
        let (max_search_results, subtopics, iterations, target_words) = match depth {
            AnalysisDepth::Basic => (3, 2, 2, 600),
            AnalysisDepth::Detailed => (5, 3, 3, 1000),
            AnalysisDepth::Deep => (7, 4, 4, 1500),
        };
        Self {
            depth,
            quick: false,
            max_search_results,
            subtopics,
            iterations,
            target_words,
            timeout_secs: timeout_for(depth, &STANDARD_TIMEOUT_SECS),
            report_timeout_secs: STANDARD_REPORT_TIMEOUT_SECS,
        }
    }

    /// Quick tier: one iteration, fewer results, a shorter target, and
    /// budgets two to three times tighter than the standard tiers.
    pub fn quick(depth: AnalysisDepth) -> Self {
        Self {
            depth,
            quick: true,
            max_search_results: 2,
            subtopics: 1,
            iterations: 1,
            target_words: 400,
            timeout_secs: timeout_for(depth, &QUICK_TIMEOUT_SECS),
            report_timeout_secs: QUICK_REPORT_TIMEOUT_SECS,
        }
    }

    pub fn resolve(depth: AnalysisDepth, quick: bool) -> Self {
        if quick {
            Self::quick(depth)
        } else {
            Self::standard(depth)
        }
    }

    /// Keywords folded into the query for this tier.
    fn keyword_budget(&self) -> usize {
        if self.quick {
            return 2;
        }
        match self.depth {
            AnalysisDepth::Basic => 3,
            AnalysisDepth::Detailed => 5,
            AnalysisDepth::Deep => usize::MAX,
        }
    }
}

// ---------------------------------------------------------------------------
// Job / context / report types
// ---------------------------------------------------------------------------

/// One unit of work handed to the research engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    /// Query text: topic plus the tier's keyword subset.
    pub query: String,
    pub source_types: Vec<String>,
    pub max_sources: u32,
    pub config: ResearchJobConfig,
}

impl ResearchJob {
    /// Resolve a task into a concrete job for the given mode.
    pub fn for_task(task: &WatchTask, quick: bool) -> Self {
        let config = ResearchJobConfig::resolve(task.analysis_depth, quick);
        let query = build_query(&task.topic, &task.keywords, config.keyword_budget());
        Self {
            query,
            source_types: task.source_types.clone(),
            max_sources: task.max_sources,
            config,
        }
    }
}

/// Topic plus the first `budget` keywords, whitespace-joined.
fn build_query(topic: &str, keywords: &[String], budget: usize) -> String {
    let mut query = topic.trim().to_owned();
    for keyword in keywords.iter().take(budget) {
        if !query.is_empty() {
            query.push(' ');
        }
        query.push_str(keyword);
    }
    query
}

/// Incrementally gathered research state. Engines append to this as they
/// work so a cancelled call still carries everything gathered so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchContext {
    pub query: String,
    /// Raw content chunks gathered from sources, in gathering order.
    pub content: Vec<String>,
    pub sources: Vec<String>,
    pub tokens_used: u64,
    /// Whether all planned iterations ran to completion.
    pub complete: bool,
}

impl ResearchContext {
    /// Total word count across gathered chunks.
    pub fn word_count(&self) -> usize {
        self.content
            .iter()
            .map(|chunk| chunk.split_whitespace().count())
            .sum()
    }
}

/// Final synthesis of a research context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchReport {
    pub text: String,
    pub sources: Vec<String>,
    pub tokens_used: u64,
}

// ---------------------------------------------------------------------------
// Engine contract
// ---------------------------------------------------------------------------

/// Research engine contract. Implementations must be cancellation-safe:
/// when `cancel` fires during `conduct_research`, return the context
/// gathered so far with `complete = false` rather than an error.
#[async_trait]
pub trait ResearchEngine: Send + Sync {
    /// Stable engine identifier for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Gather research context for the job, honouring the cancellation
    /// token between iterations.
    async fn conduct_research(
        &self,
        job: &ResearchJob,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ResearchContext>;

    /// Synthesize a report from a (possibly partial) context.
    async fn write_report(&self, context: &ResearchContext) -> anyhow::Result<ResearchReport>;

    /// Best-effort health probe.
    async fn health_check(&self) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn task_with_keywords(depth: AnalysisDepth) -> WatchTask {
        WatchTask::new("local", "AI trends", 24)
            .with_keywords(vec![
                "agents".into(),
                "inference".into(),
                "safety".into(),
                "hardware".into(),
                "regulation".into(),
                "open models".into(),
            ])
            .with_depth(depth)
    }

    #[test]
    fn standard_tier_table() {
        let basic = ResearchJobConfig::standard(AnalysisDepth::Basic);
        assert_eq!(
            (basic.max_search_results, basic.subtopics, basic.iterations, basic.target_words),
            (3, 2, 2, 600)
        );
        assert_eq!(basic.timeout_secs, 120);

        let detailed = ResearchJobConfig::standard(AnalysisDepth::Detailed);
        assert_eq!(detailed.iterations, 3);
        assert_eq!(detailed.timeout_secs, 300);

        let deep = ResearchJobConfig::standard(AnalysisDepth::Deep);
        assert_eq!(deep.target_words, 1500);
        assert_eq!(deep.timeout_secs, 600);
    }

    #[test]
    fn quick_tier_is_reduced_and_faster() {
        for depth in [
            AnalysisDepth::Basic,
            AnalysisDepth::Detailed,
            AnalysisDepth::Deep,
        ] {
            let standard = ResearchJobConfig::standard(depth);
            let quick = ResearchJobConfig::quick(depth);
            assert_eq!(quick.iterations, 1);
            assert!(quick.max_search_results < standard.max_search_results);
            assert!(quick.target_words < standard.target_words);
            // Quick budgets are 2-3x tighter.
            assert!(standard.timeout_secs / quick.timeout_secs >= 2);
            assert!(quick.report_timeout_secs < standard.report_timeout_secs);
        }
    }

    #[test]
    fn query_uses_tier_keyword_budget() {
        let task = task_with_keywords(AnalysisDepth::Basic);
        let job = ResearchJob::for_task(&task, false);
        assert_eq!(job.query, "AI trends agents inference safety");

        let task = task_with_keywords(AnalysisDepth::Deep);
        let job = ResearchJob::for_task(&task, false);
        assert!(job.query.ends_with("open models"), "deep takes all keywords");
    }

    #[test]
    fn quick_query_takes_two_keywords() {
        let task = task_with_keywords(AnalysisDepth::Deep);
        let job = ResearchJob::for_task(&task, true);
        assert_eq!(job.query, "AI trends agents inference");
        assert!(job.config.quick);
    }

    #[test]
    fn query_with_no_keywords_is_topic() {
        let task = WatchTask::new("local", "quantum computing", 24);
        let job = ResearchJob::for_task(&task, false);
        assert_eq!(job.query, "quantum computing");
    }

    #[test]
    fn context_word_count_sums_chunks() {
        let context = ResearchContext {
            query: "q".into(),
            content: vec!["one two three".into(), "four five".into()],
            sources: vec![],
            tokens_used: 0,
            complete: true,
        };
        assert_eq!(context.word_count(), 5);
    }

    #[test]
    fn config_snapshot_round_trips_as_json() {
        let config = ResearchJobConfig::quick(AnalysisDepth::Detailed);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["depth"], "detailed");
        assert_eq!(value["quick"], true);
        let back: ResearchJobConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
