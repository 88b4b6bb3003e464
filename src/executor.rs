//! Dual-mode execution of research runs.
//!
//! [`TaskExecutor`] serves scheduled and standard on-demand firings;
//! [`QuickExecutor`] serves interactive runs from a small isolated pool with
//! tighter timeouts. Both drive the same [`RunPipeline`]: research under the
//! tier timeout, report synthesis, trend analysis against recent history,
//! digest extraction, then exactly one durable history row per attempt.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analysis::{TrendAnalyzer, TrendOutcome, digest};
use crate::error::{FaireError, Result};
use crate::notify::NotificationDispatcher;
use crate::research::{ResearchContext, ResearchEngine, ResearchJob, ResearchReport};
use crate::store::WatchStore;
use crate::store::types::{HistoryRecord, RunStatus, WatchTask, new_id, now_epoch_secs};

/// How long a cancelled engine gets to hand back its partial context before
/// the run is abandoned as failed.
const CANCEL_GRACE_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Per-task run exclusion
// ---------------------------------------------------------------------------

/// Tasks with a run in flight (waiting for a pool permit or executing).
///
/// One instance is shared by both executors and the scheduler so periodic
/// firings and on-demand triggers exclude each other per task.
#[derive(Clone, Default)]
pub struct ActiveRuns {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the task for a run. `None` when a run is already in flight.
    pub fn try_begin(&self, task_id: &str) -> Option<RunGuard> {
        let mut running = self.lock();
        if !running.insert(task_id.to_owned()) {
            return None;
        }
        Some(RunGuard {
            runs: Arc::clone(&self.inner),
            task_id: task_id.to_owned(),
        })
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.lock().contains(task_id)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Sorted snapshot of in-flight task ids.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the task's run slot on drop.
pub struct RunGuard {
    runs: Arc<Mutex<HashSet<String>>>,
    task_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

// ---------------------------------------------------------------------------
// Shared pipeline
// ---------------------------------------------------------------------------

/// The research-run pipeline both executors drive.
pub struct RunPipeline {
    store: Arc<WatchStore>,
    engine: Arc<dyn ResearchEngine>,
    analyzer: TrendAnalyzer,
    dispatcher: NotificationDispatcher,
}

impl RunPipeline {
    pub fn new(
        store: Arc<WatchStore>,
        engine: Arc<dyn ResearchEngine>,
        analyzer: TrendAnalyzer,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            engine,
            analyzer,
            dispatcher,
        }
    }

    /// Execute one run end to end and return its history record.
    ///
    /// Engine faults and timeouts are contained: they become a `failed` or
    /// `partial` record, never an `Err`. Only store faults propagate.
    /// `advance_schedule` is set for periodic firings, which move `next_run`
    /// to completion time plus the task interval; triggers leave it alone.
    async fn run(
        &self,
        task: &WatchTask,
        quick: bool,
        advance_schedule: bool,
    ) -> Result<HistoryRecord> {
        let started = Instant::now();
        let executed_at = now_epoch_secs();
        let job = ResearchJob::for_task(task, quick);
        info!(
            task_id = %task.id,
            topic = %task.topic,
            quick,
            timeout_secs = job.config.timeout_secs,
            "starting research run"
        );

        let (status, error_message, context, report) = match self.research_phase(&job).await {
            Ok((context, report, partial)) => {
                let status = if partial {
                    RunStatus::Partial
                } else {
                    RunStatus::Success
                };
                (status, None, context, report)
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "research run failed");
                (
                    RunStatus::Failed,
                    Some(e.to_string()),
                    ResearchContext::default(),
                    ResearchReport::default(),
                )
            }
        };

        let mut trend: Option<TrendOutcome> = None;
        let mut summary = String::new();
        let mut key_findings = Vec::new();
        let mut key_changes = Vec::new();
        if status != RunStatus::Failed {
            let prior = self
                .store
                .recent_successes(&task.id, self.analyzer.window() as u32)?;
            let outcome =
                self.analyzer
                    .analyze(task, &report.text, report.sources.len() as u32, &prior);
            let run_digest =
                digest::build(&task.topic, &report.text, &outcome.record, outcome.trend_score);
            summary = run_digest.summary;
            key_findings = run_digest.key_findings;
            key_changes = run_digest.key_changes;
            trend = Some(outcome);
        }

        let record = HistoryRecord {
            id: new_id("run"),
            task_id: task.id.clone(),
            executed_at,
            duration_secs: started.elapsed().as_secs_f64(),
            status,
            error_message,
            report_text: report.text.clone(),
            summary,
            key_findings,
            key_changes,
            sources_count: report.sources.len() as u32,
            tokens_used: context.tokens_used + report.tokens_used,
            trend_score: trend.as_ref().map(|t| t.trend_score),
            sentiment_score: trend.as_ref().map(|t| t.sentiment_score),
            research_config: serde_json::to_value(&job.config)?,
            sources_used: report.sources,
        };

        let next_run = advance_schedule.then(|| now_epoch_secs() + task.interval_secs());
        self.store.record_execution(&record, next_run)?;
        if let Some(outcome) = &trend {
            self.store.append_trend(&outcome.record)?;
            self.dispatcher.dispatch_run(task, &record, Some(&outcome.record));
        }

        info!(
            task_id = %task.id,
            status = record.status.as_str(),
            duration_secs = record.duration_secs,
            sources = record.sources_count,
            "run recorded"
        );
        Ok(record)
    }

    /// Research then synthesis, both under their budgets.
    ///
    /// On research timeout the token is cancelled and the engine's partial
    /// context is still collected and synthesized; the `bool` reports
    /// whether the result is partial.
    async fn research_phase(
        &self,
        job: &ResearchJob,
    ) -> Result<(ResearchContext, ResearchReport, bool)> {
        let cancel = CancellationToken::new();
        let research = self.engine.conduct_research(job, &cancel);
        tokio::pin!(research);

        let mut timed_out = false;
        let context = tokio::select! {
            result = &mut research => {
                result.map_err(|e| FaireError::Engine(e.to_string()))?
            }
            () = tokio::time::sleep(Duration::from_secs(job.config.timeout_secs)) => {
                timed_out = true;
                cancel.cancel();
                match tokio::time::timeout(
                    Duration::from_secs(CANCEL_GRACE_SECS),
                    &mut research,
                )
                .await
                {
                    Ok(result) => result.map_err(|e| FaireError::Engine(e.to_string()))?,
                    Err(_) => {
                        return Err(FaireError::Engine(format!(
                            "engine '{}' did not stop within {CANCEL_GRACE_SECS}s of cancellation",
                            self.engine.name()
                        )));
                    }
                }
            }
        };
        if timed_out {
            warn!(query = %job.query, "research timed out, synthesizing partial context");
        }

        let report = match tokio::time::timeout(
            Duration::from_secs(job.config.report_timeout_secs),
            self.engine.write_report(&context),
        )
        .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => return Err(FaireError::Engine(e.to_string())),
            Err(_) => {
                return Err(FaireError::Timeout(format!(
                    "report synthesis exceeded {}s",
                    job.config.report_timeout_secs
                )));
            }
        };

        let partial = timed_out || !context.complete;
        Ok((context, report, partial))
    }
}

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// Standard executor: full tier timeouts, permits are waited for.
pub struct TaskExecutor {
    pipeline: Arc<RunPipeline>,
    active: ActiveRuns,
    permits: Arc<Semaphore>,
}

impl TaskExecutor {
    pub fn new(pipeline: Arc<RunPipeline>, active: ActiveRuns, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            active,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run a periodic firing; advances the task's schedule on completion.
    pub async fn execute_scheduled(&self, task: &WatchTask) -> Result<HistoryRecord> {
        let _guard = self.claim(task)?;
        let _permit = self.acquire().await?;
        self.pipeline.run(task, false, true).await
    }

    /// Run an on-demand trigger; the periodic schedule is untouched.
    pub async fn execute_triggered(&self, task: &WatchTask) -> Result<HistoryRecord> {
        let _guard = self.claim(task)?;
        let _permit = self.acquire().await?;
        self.pipeline.run(task, false, false).await
    }

    fn claim(&self, task: &WatchTask) -> Result<RunGuard> {
        self.active.try_begin(&task.id).ok_or_else(|| {
            FaireError::ConcurrencyConflict(format!("task {} already has a run in flight", task.id))
        })
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| FaireError::Execution("standard executor pool closed".to_owned()))
    }
}

/// Quick executor: reduced research scope, short timeouts, and a small pool
/// that rejects instead of queueing so trigger latency stays predictable.
pub struct QuickExecutor {
    pipeline: Arc<RunPipeline>,
    active: ActiveRuns,
    permits: Arc<Semaphore>,
}

impl QuickExecutor {
    pub fn new(pipeline: Arc<RunPipeline>, active: ActiveRuns, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            active,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run an interactive quick trigger; the periodic schedule is untouched.
    pub async fn execute(&self, task: &WatchTask) -> Result<HistoryRecord> {
        let _guard = self.active.try_begin(&task.id).ok_or_else(|| {
            FaireError::ConcurrencyConflict(format!("task {} already has a run in flight", task.id))
        })?;
        let _permit = self.permits.try_acquire().map_err(|_| {
            FaireError::ConcurrencyConflict("quick executor pool at capacity".to_owned())
        })?;
        self.pipeline.run(task, true, false).await
    }
}
