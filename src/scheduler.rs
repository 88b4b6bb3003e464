//! Periodic scheduling of watch task runs.
//!
//! [`SchedulerManager`] owns a background loop that scans the store for due
//! tasks on a fixed tick and hands each one to the standard executor. It is
//! also the entry point for schedule management (pause, resume, manual
//! triggers) and exposes a status snapshot for the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FaireError, Result};
use crate::executor::{ActiveRuns, QuickExecutor, TaskExecutor};
use crate::store::WatchStore;
use crate::store::types::{HistoryRecord, WatchTask, now_epoch_secs};

/// Snapshot of the scheduler returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Whether the tick loop is running.
    pub running: bool,
    /// Number of active tasks registered for periodic execution.
    pub scheduled_jobs: u64,
    /// Ids of tasks with a run currently in flight.
    pub executing: Vec<String>,
}

/// Drives periodic firings and owns schedule state transitions.
///
/// Schedule state lives in the store (`next_run`, `is_active`), so a process
/// restart picks up exactly where the previous one stopped: a task overdue
/// at startup fires on the first tick, once, and resumes its cadence from
/// that run's completion time.
pub struct SchedulerManager {
    store: Arc<WatchStore>,
    standard: Arc<TaskExecutor>,
    quick: Arc<QuickExecutor>,
    active: ActiveRuns,
    tick_interval: Duration,
    running: AtomicBool,
    loop_cancel: Mutex<CancellationToken>,
}

impl SchedulerManager {
    pub fn new(
        store: Arc<WatchStore>,
        standard: Arc<TaskExecutor>,
        quick: Arc<QuickExecutor>,
        active: ActiveRuns,
        tick_interval_secs: u64,
    ) -> Self {
        Self {
            store,
            standard,
            quick,
            active,
            tick_interval: Duration::from_secs(tick_interval_secs.max(1)),
            running: AtomicBool::new(false),
            loop_cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Start the background tick loop.
    ///
    /// Returns `None` if the loop is already running. The first tick fires
    /// immediately, which is what catches up tasks that came due while the
    /// process was down.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler is already running");
            return None;
        }
        let cancel = CancellationToken::new();
        *self.lock_cancel() = cancel.clone();
        info!("scheduler started, tick every {}s", self.tick_interval.as_secs());

        let manager = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.tick_interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => manager.tick(),
                }
            }
            info!("scheduler loop exited");
        }))
    }

    /// Stop the tick loop. Runs already in flight are left to finish.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.lock_cancel().cancel();
            info!("scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One scan: fire a run for every active task whose `next_run` has
    /// passed. Firings are spawned, never awaited, so a slow run cannot
    /// stall the loop. A task whose previous run is still in flight is
    /// deferred to a later tick.
    fn tick(&self) {
        let due = match self.store.due_tasks(now_epoch_secs()) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "due-task scan failed");
                return;
            }
        };
        if !due.is_empty() {
            debug!(count = due.len(), "due tasks found");
        }
        for task in due {
            if self.active.contains(&task.id) {
                debug!(task_id = %task.id, "previous run still in flight, deferring");
                continue;
            }
            let executor = Arc::clone(&self.standard);
            tokio::spawn(async move {
                match executor.execute_scheduled(&task).await {
                    Ok(record) => debug!(
                        task_id = %task.id,
                        status = record.status.as_str(),
                        "scheduled run finished"
                    ),
                    Err(FaireError::ConcurrencyConflict(reason)) => {
                        debug!(task_id = %task.id, reason, "scheduled firing skipped");
                    }
                    Err(e) => warn!(task_id = %task.id, error = %e, "scheduled run aborted"),
                }
            });
        }
    }

    /// Register a task for periodic execution and return its next firing
    /// time.
    ///
    /// A stored future `next_run` is kept (restart and resume cases);
    /// otherwise the first firing lands one interval out. Rejects tasks
    /// that fail validation.
    pub fn schedule(&self, task: &WatchTask) -> Result<u64> {
        task.validate()?;
        let now = now_epoch_secs();
        let next = match task.next_run {
            Some(at) if at > now => at,
            _ => now + task.interval_secs(),
        };
        self.store.set_next_run(&task.id, Some(next))?;
        info!(
            task_id = %task.id,
            topic = %task.topic,
            interval_hours = task.interval_hours,
            next_run = next,
            "task scheduled"
        );
        Ok(next)
    }

    /// Reload schedules for active tasks after a restart.
    ///
    /// Stored `next_run` values survive restarts, and past-due tasks fire
    /// on the first tick. An active task missing its `next_run` is given a
    /// fresh slot one interval out. Returns the number of active tasks.
    pub fn restore(&self) -> Result<u64> {
        let tasks = self.store.list_tasks(None, true)?;
        let mut repaired = 0u64;
        for task in &tasks {
            if task.next_run.is_none() {
                self.schedule(task)?;
                repaired += 1;
            }
        }
        info!(
            active = tasks.len(),
            repaired, "restored schedules from store"
        );
        Ok(tasks.len() as u64)
    }

    /// Remove a task's periodic trigger. Idempotent: unknown ids are fine.
    pub fn unschedule(&self, task_id: &str) -> Result<()> {
        match self.store.set_next_run(task_id, None) {
            Ok(()) | Err(FaireError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Pause a task. It stays stored with its history but no longer fires;
    /// a run already in flight is left to finish.
    pub fn pause(&self, task_id: &str) -> Result<WatchTask> {
        self.store.set_active(task_id, false, None)?;
        info!(task_id, "task paused");
        self.store.get_task(task_id)
    }

    /// Resume a paused task. A stored future `next_run` is kept; otherwise
    /// the next firing lands one interval from now.
    pub fn resume(&self, task_id: &str) -> Result<WatchTask> {
        let task = self.store.get_task(task_id)?;
        let now = now_epoch_secs();
        let next = match task.next_run {
            Some(at) if at > now => at,
            _ => now + task.interval_secs(),
        };
        self.store.set_active(task_id, true, Some(next))?;
        info!(task_id, next_run = next, "task resumed");
        self.store.get_task(task_id)
    }

    /// Fire an out-of-band run immediately and wait for its record.
    ///
    /// The run is spawned on its own task so an abandoned caller cannot
    /// abort a half-finished attempt. Works on paused tasks. A run already
    /// in flight for the task, or a full quick pool, surfaces as
    /// [`FaireError::ConcurrencyConflict`] right away. The periodic
    /// schedule is never touched.
    pub async fn trigger_now(&self, task_id: &str, quick: bool) -> Result<HistoryRecord> {
        let task = self.store.get_task(task_id)?;
        info!(task_id, quick, "manual trigger");
        let handle = if quick {
            let executor = Arc::clone(&self.quick);
            tokio::spawn(async move { executor.execute(&task).await })
        } else {
            let executor = Arc::clone(&self.standard);
            tokio::spawn(async move { executor.execute_triggered(&task).await })
        };
        handle
            .await
            .map_err(|e| FaireError::Execution(format!("triggered run panicked: {e}")))?
    }

    /// Snapshot for the status endpoint.
    pub fn status(&self) -> Result<SchedulerStatus> {
        Ok(SchedulerStatus {
            running: self.is_running(),
            scheduled_jobs: self.store.count_active()?,
            executing: self.active.snapshot(),
        })
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.loop_cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
