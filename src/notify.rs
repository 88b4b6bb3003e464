//! Live result notifications over a broadcast channel.
//!
//! When a run produces a materially important result, one
//! [`ScheduledResultEvent`] is broadcast to whoever is subscribed (the SSE
//! gateway, tests, nobody at all). Delivery is fire-and-forget; the history
//! and trends tables remain the durable record.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::store::types::{HistoryRecord, TrendRecord, WatchTask, epoch_to_rfc3339};

/// Trend score at which an event is marked `warning` instead of `info`.
const WARNING_TREND_SCORE: f64 = 8.0;

/// Default broadcast buffer; slow subscribers lag rather than block senders.
pub const DEFAULT_EVENTS_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// One qualifying run, as pushed to live subscribers.
///
/// `task_id` plus `timestamp` identify the run; subscribers seeing a pair
/// twice may drop the duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledResultEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub task_id: String,
    pub topic: String,
    /// Execution time, RFC3339.
    pub timestamp: String,
    pub summary: String,
    pub key_changes: Vec<String>,
    pub trend_score: f64,
    pub sources_count: u32,
    pub severity: Severity,
}

/// Decides which runs are worth announcing and broadcasts them.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: broadcast::Sender<ScheduledResultEvent>,
}

impl NotificationDispatcher {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScheduledResultEvent> {
        self.tx.subscribe()
    }

    /// Broadcast the run if it qualifies; at most one event per run.
    ///
    /// Qualifies when the trend analysis flagged an anomaly, or the run's
    /// trend score reached the task's notification threshold. A send with
    /// no subscribers is not an error.
    pub fn dispatch_run(
        &self,
        task: &WatchTask,
        record: &HistoryRecord,
        trend: Option<&TrendRecord>,
    ) {
        let trend_score = record.trend_score.unwrap_or(0.0);
        let anomaly = trend.is_some_and(|t| t.anomaly_detected);
        if !anomaly && trend_score < task.notification_threshold {
            return;
        }

        let severity = if trend_score >= WARNING_TREND_SCORE {
            Severity::Warning
        } else {
            Severity::Info
        };

        let event = ScheduledResultEvent {
            kind: "scheduled_result".to_owned(),
            task_id: task.id.clone(),
            topic: task.topic.clone(),
            timestamp: epoch_to_rfc3339(record.executed_at),
            summary: record.summary.clone(),
            key_changes: record.key_changes.clone(),
            trend_score,
            sources_count: record.sources_count,
            severity,
        };

        match self.tx.send(event) {
            Ok(subscribers) => {
                debug!(task_id = %task.id, subscribers, "broadcast scheduled result");
            }
            Err(_) => {
                debug!(task_id = %task.id, "no subscribers for scheduled result");
            }
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENTS_BUFFER)
    }
}
