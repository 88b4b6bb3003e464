//! Shared types, constants, and helpers for the persistence layer.
//!
//! Tasks, history rows, and trend rows are plain serde structs; timestamps
//! are epoch seconds and only rendered as RFC3339 at the gateway and
//! notification edges.

use crate::error::{FaireError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Schema / limits
// ---------------------------------------------------------------------------

pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Hard cap on sources any task may request per run.
pub const MAX_SOURCES_CAP: u32 = 50;

/// Default sources per run when a task does not specify one.
pub const DEFAULT_MAX_SOURCES: u32 = 10;

/// Default trend-score boundary above which a live event fires.
pub const DEFAULT_NOTIFICATION_THRESHOLD: f64 = 7.0;

/// Upper end of the notification threshold scale.
pub const NOTIFICATION_THRESHOLD_MAX: f64 = 10.0;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Research depth tier for a task. Unknown strings are rejected at every
/// boundary; there is no silent default for bad input.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    #[default]
    Basic,
    Detailed,
    Deep,
}

impl AnalysisDepth {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisDepth::Basic => "basic",
            AnalysisDepth::Detailed => "detailed",
            AnalysisDepth::Deep => "deep",
        }
    }

    /// Parse a stored tier name, rejecting anything outside the closed set.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "basic" => Ok(AnalysisDepth::Basic),
            "detailed" => Ok(AnalysisDepth::Detailed),
            "deep" => Ok(AnalysisDepth::Deep),
            other => Err(FaireError::Configuration(format!(
                "unknown analysis depth: {other}"
            ))),
        }
    }
}

/// Outcome of a single execution attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    /// Research ran out of budget; a report was synthesized from the partial
    /// context gathered before cancellation.
    Partial,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "partial" => Ok(RunStatus::Partial),
            other => Err(FaireError::Store(format!("unknown run status: {other}"))),
        }
    }

    /// Partial runs produced usable output, so they count toward the
    /// success side of the run counters.
    pub fn counts_as_success(self) -> bool {
        !matches!(self, RunStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Serde defaults (referenced by field attributes)
// ---------------------------------------------------------------------------

fn default_owner() -> String {
    "local".to_owned()
}

fn default_source_types() -> Vec<String> {
    vec!["web".to_owned()]
}

fn default_max_sources() -> u32 {
    DEFAULT_MAX_SOURCES
}

fn default_notification_threshold() -> f64 {
    DEFAULT_NOTIFICATION_THRESHOLD
}

// ---------------------------------------------------------------------------
// Core structs
// ---------------------------------------------------------------------------

/// A user-configured recurring research topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchTask {
    pub id: String,
    #[serde(default = "default_owner")]
    pub owner_id: String,
    pub topic: String,
    /// Tracked keywords, order-preserving and de-duplicated.
    #[serde(default)]
    pub keywords: Vec<String>,
    pub interval_hours: u32,
    pub is_active: bool,
    /// Epoch seconds of the next periodic firing; absent while paused.
    #[serde(default)]
    pub next_run: Option<u64>,
    #[serde(default)]
    pub analysis_depth: AnalysisDepth,
    #[serde(default = "default_source_types")]
    pub source_types: Vec<String>,
    #[serde(default = "default_max_sources")]
    pub max_sources: u32,
    #[serde(default = "default_notification_threshold")]
    pub notification_threshold: f64,
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub success_runs: u64,
    #[serde(default)]
    pub failed_runs: u64,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub last_run: Option<u64>,
}

impl WatchTask {
    /// Create a task with defaults; the caller still runs [`validate`].
    ///
    /// [`validate`]: WatchTask::validate
    pub fn new(owner_id: impl Into<String>, topic: impl Into<String>, interval_hours: u32) -> Self {
        let now = now_epoch_secs();
        Self {
            id: new_id("task"),
            owner_id: owner_id.into(),
            topic: topic.into(),
            keywords: Vec::new(),
            interval_hours,
            is_active: true,
            next_run: None,
            analysis_depth: AnalysisDepth::Basic,
            source_types: default_source_types(),
            max_sources: DEFAULT_MAX_SOURCES,
            notification_threshold: DEFAULT_NOTIFICATION_THRESHOLD,
            total_runs: 0,
            success_runs: 0,
            failed_runs: 0,
            created_at: now,
            updated_at: now,
            last_run: None,
        }
    }

    /// Set the tracked keywords, dropping duplicates while keeping order.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = dedup_keywords(keywords);
        self
    }

    /// Set the analysis depth tier.
    pub fn with_depth(mut self, depth: AnalysisDepth) -> Self {
        self.analysis_depth = depth;
        self
    }

    /// Set the notification threshold (validated later against 0..=10).
    pub fn with_notification_threshold(mut self, threshold: f64) -> Self {
        self.notification_threshold = threshold;
        self
    }

    /// Check the task parameters that must hold before scheduling.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(FaireError::Configuration("topic must not be empty".into()));
        }
        if self.interval_hours == 0 {
            return Err(FaireError::Configuration(
                "interval_hours must be positive".into(),
            ));
        }
        if !(0.0..=NOTIFICATION_THRESHOLD_MAX).contains(&self.notification_threshold) {
            return Err(FaireError::Configuration(format!(
                "notification_threshold {} outside 0..={NOTIFICATION_THRESHOLD_MAX}",
                self.notification_threshold
            )));
        }
        if self.max_sources == 0 || self.max_sources > MAX_SOURCES_CAP {
            return Err(FaireError::Configuration(format!(
                "max_sources {} outside 1..={MAX_SOURCES_CAP}",
                self.max_sources
            )));
        }
        Ok(())
    }

    /// Returns `true` if the task is active and its next_run has passed.
    pub fn is_due(&self, now: u64) -> bool {
        if !self.is_active {
            return false;
        }
        match self.next_run {
            Some(at) => now >= at,
            None => false,
        }
    }

    /// The interval expressed in seconds.
    pub fn interval_secs(&self) -> u64 {
        u64::from(self.interval_hours) * 3600
    }

    /// Fraction of completed runs that produced usable output.
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            return 0.0;
        }
        self.success_runs as f64 / self.total_runs as f64
    }
}

/// Partial update applied to an existing task. `None` fields are untouched.
/// Activation is owned by pause/resume, not by update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub topic: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub interval_hours: Option<u32>,
    pub analysis_depth: Option<AnalysisDepth>,
    pub source_types: Option<Vec<String>>,
    pub max_sources: Option<u32>,
    pub notification_threshold: Option<f64>,
}

impl TaskUpdate {
    /// Apply the patch to a task, returning the updated copy after
    /// re-validation.
    pub fn apply_to(&self, task: &WatchTask) -> Result<WatchTask> {
        let mut updated = task.clone();
        if let Some(topic) = &self.topic {
            updated.topic = topic.clone();
        }
        if let Some(keywords) = &self.keywords {
            updated.keywords = dedup_keywords(keywords.clone());
        }
        if let Some(hours) = self.interval_hours {
            updated.interval_hours = hours;
        }
        if let Some(depth) = self.analysis_depth {
            updated.analysis_depth = depth;
        }
        if let Some(sources) = &self.source_types {
            updated.source_types = sources.clone();
        }
        if let Some(max) = self.max_sources {
            updated.max_sources = max;
        }
        if let Some(threshold) = self.notification_threshold {
            updated.notification_threshold = threshold;
        }
        updated.updated_at = now_epoch_secs();
        updated.validate()?;
        Ok(updated)
    }
}

/// The durable outcome of one execution attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub task_id: String,
    pub executed_at: u64,
    pub duration_secs: f64,
    pub status: RunStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Full synthesized report text; trend analysis of later runs compares
    /// keyword frequencies against this.
    #[serde(default)]
    pub report_text: String,
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub key_changes: Vec<String>,
    #[serde(default)]
    pub sources_count: u32,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub trend_score: Option<f64>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    /// Snapshot of the resolved run configuration, for reproducibility.
    #[serde(default)]
    pub research_config: serde_json::Value,
    #[serde(default)]
    pub sources_used: Vec<String>,
}

/// How the prominent terms of a run relate to the rolling window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicEvolution {
    /// Terms prominent now that were absent from the window.
    pub appeared: Vec<String>,
    /// Terms prominent in the window that vanished from this run.
    pub disappeared: Vec<String>,
    /// Terms prominent in both.
    pub persistent: Vec<String>,
    /// Share of current prominent terms that are new (0..=1).
    pub evolution_rate: f64,
}

/// Derived analytics comparing one run against the task's prior history.
/// Append-only and never hand-edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendRecord {
    pub id: String,
    pub task_id: String,
    pub analyzed_at: u64,
    /// Per-keyword trend score, symmetric around 0.
    #[serde(default)]
    pub keyword_trends: BTreeMap<String, f64>,
    #[serde(default)]
    pub sentiment_change: f64,
    #[serde(default)]
    pub topic_evolution: TopicEvolution,
    #[serde(default)]
    pub new_topics: Vec<String>,
    #[serde(default)]
    pub emerging_keywords: Vec<String>,
    pub activity_level: f64,
    pub change_magnitude: f64,
    pub confidence_score: f64,
    pub anomaly_detected: bool,
    #[serde(default)]
    pub anomaly_description: Option<String>,
}

// ---------------------------------------------------------------------------
// Aggregate statistics views
// ---------------------------------------------------------------------------

/// Rollup for one task's execution record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatistics {
    pub task: WatchTask,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub success_rate: f64,
    pub average_trend_score: Option<f64>,
    /// Message of the most recent errored run, if any.
    pub last_error: Option<String>,
    pub latest_trend: Option<TrendRecord>,
    pub uptime_days: f64,
}

/// Rollup across all of an owner's tasks.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerStatistics {
    pub owner_id: String,
    pub total_tasks: u64,
    pub active_tasks: u64,
    pub inactive_tasks: u64,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub overall_success_rate: f64,
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Drop duplicate keywords while preserving first-seen order.
pub(crate) fn dedup_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.trim().to_owned())
        .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
        .collect()
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

/// Returns current UTC seconds since epoch.
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Render an epoch-seconds timestamp as RFC3339 for API and event payloads.
pub fn epoch_to_rfc3339(secs: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0)
        .unwrap_or_default()
        .to_rfc3339()
}
