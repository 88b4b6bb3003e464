//! SQLite-backed persistence for tasks, history, and trends.
//!
//! A single database file holds all three tables. Thread-safe via an
//! internal `Mutex<Connection>`; writes are serialized, reads proceed
//! concurrently on the SQLite side with WAL mode.

pub mod schema;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::{FaireError, Result};
use schema::{apply_schema, read_schema_version};
use types::{
    AnalysisDepth, HistoryRecord, OwnerStatistics, RunStatus, TaskStatistics, TrendRecord,
    WatchTask, now_epoch_secs,
};

/// Database filename within the data directory.
const DB_FILENAME: &str = "faire.db";

/// Maximum history page size accepted from callers.
const MAX_PAGE_SIZE: u32 = 100;

/// One page of query results with pagination bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// SQLite-backed store for tasks, history rows, and trend rows.
pub struct WatchStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl WatchStore {
    /// Open (or create) the database at `{data_dir}/faire.db`.
    ///
    /// Applies the schema if the database is new.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(DB_FILENAME);
        let conn = Connection::open(&path)?;
        apply_schema(&conn)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current schema version from the database.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    // -----------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------

    /// Insert a new task after validating it.
    pub fn create_task(&self, task: &WatchTask) -> Result<()> {
        task.validate()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks \
             (id, owner_id, topic, keywords, interval_hours, is_active, next_run, \
              analysis_depth, source_types, max_sources, notification_threshold, \
              total_runs, success_runs, failed_runs, created_at, updated_at, last_run) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                task.id,
                task.owner_id,
                task.topic,
                serde_json::to_string(&task.keywords)?,
                task.interval_hours,
                task.is_active,
                task.next_run,
                task.analysis_depth.as_str(),
                serde_json::to_string(&task.source_types)?,
                task.max_sources,
                task.notification_threshold,
                task.total_runs,
                task.success_runs,
                task.failed_runs,
                task.created_at,
                task.updated_at,
                task.last_run,
            ],
        )?;
        Ok(())
    }

    /// Fetch one task by id.
    pub fn get_task(&self, id: &str) -> Result<WatchTask> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{TASK_COLUMNS} WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], row_to_task)?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Err(FaireError::NotFound(format!("task {id}"))),
        }
    }

    /// List tasks, newest first, optionally filtered by owner and activity.
    pub fn list_tasks(&self, owner: Option<&str>, active_only: bool) -> Result<Vec<WatchTask>> {
        let conn = self.lock()?;
        let mut sql = TASK_COLUMNS.to_owned();
        let mut clauses: Vec<&str> = Vec::new();
        if owner.is_some() {
            clauses.push("owner_id = ?1");
        }
        if active_only {
            clauses.push("is_active = 1");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let mut tasks = Vec::new();
        match owner {
            Some(owner) => {
                for row in stmt.query_map(params![owner], row_to_task)? {
                    tasks.push(row?);
                }
            }
            None => {
                for row in stmt.query_map([], row_to_task)? {
                    tasks.push(row?);
                }
            }
        }
        Ok(tasks)
    }

    /// Replace a task's mutable configuration fields.
    pub fn update_task(&self, task: &WatchTask) -> Result<()> {
        task.validate()?;
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET topic = ?1, keywords = ?2, interval_hours = ?3, \
             analysis_depth = ?4, source_types = ?5, max_sources = ?6, \
             notification_threshold = ?7, updated_at = ?8 WHERE id = ?9",
            params![
                task.topic,
                serde_json::to_string(&task.keywords)?,
                task.interval_hours,
                task.analysis_depth.as_str(),
                serde_json::to_string(&task.source_types)?,
                task.max_sources,
                task.notification_threshold,
                now_epoch_secs(),
                task.id,
            ],
        )?;
        if rows == 0 {
            return Err(FaireError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    /// Delete a task; history and trend rows cascade.
    pub fn delete_task(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(FaireError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Toggle activation and set or clear next_run in the same statement.
    pub fn set_active(&self, id: &str, active: bool, next_run: Option<u64>) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET is_active = ?1, next_run = ?2, updated_at = ?3 WHERE id = ?4",
            params![active, next_run, now_epoch_secs(), id],
        )?;
        if rows == 0 {
            return Err(FaireError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Set (or clear) a task's next periodic firing time.
    pub fn set_next_run(&self, id: &str, next_run: Option<u64>) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET next_run = ?1, updated_at = ?2 WHERE id = ?3",
            params![next_run, now_epoch_secs(), id],
        )?;
        if rows == 0 {
            return Err(FaireError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Active tasks whose next_run has passed.
    pub fn due_tasks(&self, now: u64) -> Result<Vec<WatchTask>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{TASK_COLUMNS} WHERE is_active = 1 AND next_run IS NOT NULL AND next_run <= ?1 \
             ORDER BY next_run ASC"
        ))?;
        let mut tasks = Vec::new();
        for row in stmt.query_map(params![now], row_to_task)? {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Number of active (scheduled) tasks.
    pub fn count_active(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // -----------------------------------------------------------------
    // Execution outcomes
    // -----------------------------------------------------------------

    /// Append a history row and advance the task's run counters in one
    /// transaction. `next_run` is set only when given (periodic firings);
    /// on-demand triggers pass `None` and leave the cadence untouched.
    ///
    /// The commit happens before any in-memory scheduler state moves, so a
    /// crash after this call leaves a consistent, re-derivable store.
    pub fn record_execution(&self, record: &HistoryRecord, next_run: Option<u64>) -> Result<()> {
        let conn = self.lock()?;
        let now = now_epoch_secs();
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO history \
             (id, task_id, executed_at, duration_secs, status, error_message, report_text, \
              summary, key_findings, key_changes, sources_count, tokens_used, trend_score, \
              sentiment_score, research_config, sources_used) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                record.id,
                record.task_id,
                record.executed_at,
                record.duration_secs,
                record.status.as_str(),
                record.error_message,
                record.report_text,
                record.summary,
                serde_json::to_string(&record.key_findings)?,
                serde_json::to_string(&record.key_changes)?,
                record.sources_count,
                record.tokens_used,
                record.trend_score,
                record.sentiment_score,
                serde_json::to_string(&record.research_config)?,
                serde_json::to_string(&record.sources_used)?,
            ],
        )?;

        let counter_column = if record.status.counts_as_success() {
            "success_runs"
        } else {
            "failed_runs"
        };
        let update_sql = match next_run {
            Some(_) => format!(
                "UPDATE tasks SET total_runs = total_runs + 1, {counter_column} = {counter_column} + 1, \
                 last_run = ?1, updated_at = ?1, next_run = ?2 WHERE id = ?3"
            ),
            None => format!(
                "UPDATE tasks SET total_runs = total_runs + 1, {counter_column} = {counter_column} + 1, \
                 last_run = ?1, updated_at = ?1 WHERE id = ?2"
            ),
        };
        let updated = match next_run {
            Some(at) => tx.execute(&update_sql, params![now, at, record.task_id])?,
            None => tx.execute(&update_sql, params![now, record.task_id])?,
        };
        if updated == 0 {
            return Err(FaireError::NotFound(format!("task {}", record.task_id)));
        }

        tx.commit()?;
        Ok(())
    }

    /// Append one trend row.
    pub fn append_trend(&self, record: &TrendRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO trends \
             (id, task_id, analyzed_at, keyword_trends, sentiment_change, topic_evolution, \
              new_topics, emerging_keywords, activity_level, change_magnitude, \
              confidence_score, anomaly_detected, anomaly_description) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.task_id,
                record.analyzed_at,
                serde_json::to_string(&record.keyword_trends)?,
                record.sentiment_change,
                serde_json::to_string(&record.topic_evolution)?,
                serde_json::to_string(&record.new_topics)?,
                serde_json::to_string(&record.emerging_keywords)?,
                record.activity_level,
                record.change_magnitude,
                record.confidence_score,
                record.anomaly_detected,
                record.anomaly_description,
            ],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // History queries
    // -----------------------------------------------------------------

    /// One page of a task's history, newest first.
    pub fn history_page(&self, task_id: &str, page: u32, per_page: u32) -> Result<Page<HistoryRecord>> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        let conn = self.lock()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM history WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;

        let offset = u64::from(page - 1) * u64::from(per_page);
        let mut stmt = conn.prepare(&format!(
            "{HISTORY_COLUMNS} WHERE task_id = ?1 ORDER BY executed_at DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let mut items = Vec::new();
        for row in stmt.query_map(params![task_id, per_page, offset], row_to_history)? {
            items.push(row?);
        }

        let total = total as u64;
        let total_pages = (total.div_ceil(u64::from(per_page))) as u32;
        Ok(Page {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    /// The most recent runs that produced usable output (success or
    /// partial), newest first. Feeds the trend analyzer's rolling window.
    pub fn recent_successes(&self, task_id: &str, limit: u32) -> Result<Vec<HistoryRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{HISTORY_COLUMNS} WHERE task_id = ?1 AND status != 'failed' \
             ORDER BY executed_at DESC LIMIT ?2"
        ))?;
        let mut records = Vec::new();
        for row in stmt.query_map(params![task_id, limit], row_to_history)? {
            records.push(row?);
        }
        Ok(records)
    }

    /// The single most recent history row for a task, if any.
    pub fn latest_history(&self, task_id: &str) -> Result<Option<HistoryRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{HISTORY_COLUMNS} WHERE task_id = ?1 ORDER BY executed_at DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![task_id], row_to_history)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------
    // Trend queries
    // -----------------------------------------------------------------

    /// Trend rows within the last `days`, chronological (oldest first).
    pub fn trends_since(&self, task_id: &str, days: u32) -> Result<Vec<TrendRecord>> {
        let cutoff = now_epoch_secs().saturating_sub(u64::from(days) * 86_400);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{TREND_COLUMNS} WHERE task_id = ?1 AND analyzed_at >= ?2 ORDER BY analyzed_at ASC"
        ))?;
        let mut records = Vec::new();
        for row in stmt.query_map(params![task_id, cutoff], row_to_trend)? {
            records.push(row?);
        }
        Ok(records)
    }

    /// The most recent trend row for a task, if any.
    pub fn latest_trend(&self, task_id: &str) -> Result<Option<TrendRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{TREND_COLUMNS} WHERE task_id = ?1 ORDER BY analyzed_at DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![task_id], row_to_trend)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------
    // Aggregate statistics
    // -----------------------------------------------------------------

    /// Execution rollup for one task.
    pub fn task_statistics(&self, task_id: &str) -> Result<TaskStatistics> {
        let task = self.get_task(task_id)?;
        let latest_trend = self.latest_trend(task_id)?;
        let conn = self.lock()?;

        let (total, successful): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status != 'failed'), 0) FROM history WHERE task_id = ?1",
            params![task_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let average_trend_score: Option<f64> = conn.query_row(
            "SELECT AVG(trend_score) FROM history WHERE task_id = ?1 AND trend_score IS NOT NULL",
            params![task_id],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT error_message FROM history \
             WHERE task_id = ?1 AND error_message IS NOT NULL \
             ORDER BY executed_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![task_id], |row| row.get::<_, String>(0))?;
        let last_error = rows.next().transpose()?;

        let success_rate = if total > 0 {
            successful as f64 / total as f64
        } else {
            0.0
        };
        let uptime_days =
            now_epoch_secs().saturating_sub(task.created_at) as f64 / 86_400.0;

        Ok(TaskStatistics {
            task,
            total_executions: total as u64,
            successful_executions: successful as u64,
            success_rate,
            average_trend_score,
            last_error,
            latest_trend,
            uptime_days,
        })
    }

    /// Execution rollup across all of an owner's tasks.
    pub fn owner_statistics(&self, owner_id: &str) -> Result<OwnerStatistics> {
        let conn = self.lock()?;
        let (total_tasks, active_tasks, total_runs, success_runs): (i64, i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(is_active), 0), \
                 COALESCE(SUM(total_runs), 0), COALESCE(SUM(success_runs), 0) \
                 FROM tasks WHERE owner_id = ?1",
                params![owner_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let overall_success_rate = if total_runs > 0 {
            success_runs as f64 / total_runs as f64
        } else {
            0.0
        };

        Ok(OwnerStatistics {
            owner_id: owner_id.to_owned(),
            total_tasks: total_tasks as u64,
            active_tasks: active_tasks as u64,
            inactive_tasks: (total_tasks - active_tasks) as u64,
            total_executions: total_runs as u64,
            successful_executions: success_runs as u64,
            overall_success_rate,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FaireError::Store(format!("lock poisoned: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

const TASK_COLUMNS: &str = "SELECT id, owner_id, topic, keywords, interval_hours, is_active, \
    next_run, analysis_depth, source_types, max_sources, notification_threshold, total_runs, \
    success_runs, failed_runs, created_at, updated_at, last_run FROM tasks";

const HISTORY_COLUMNS: &str = "SELECT id, task_id, executed_at, duration_secs, status, \
    error_message, report_text, summary, key_findings, key_changes, sources_count, tokens_used, \
    trend_score, sentiment_score, research_config, sources_used FROM history";

const TREND_COLUMNS: &str = "SELECT id, task_id, analyzed_at, keyword_trends, sentiment_change, \
    topic_evolution, new_topics, emerging_keywords, activity_level, change_magnitude, \
    confidence_score, anomaly_detected, anomaly_description FROM trends";

fn text_column_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<WatchTask> {
    let keywords_json: String = row.get(3)?;
    let depth_str: String = row.get(7)?;
    let sources_json: String = row.get(8)?;

    Ok(WatchTask {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        topic: row.get(2)?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        interval_hours: row.get(4)?,
        is_active: row.get(5)?,
        next_run: row.get(6)?,
        analysis_depth: AnalysisDepth::parse(&depth_str)
            .map_err(|e| text_column_err(7, e.to_string()))?,
        source_types: serde_json::from_str(&sources_json).unwrap_or_default(),
        max_sources: row.get(9)?,
        notification_threshold: row.get(10)?,
        total_runs: row.get(11)?,
        success_runs: row.get(12)?,
        failed_runs: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        last_run: row.get(16)?,
    })
}

fn row_to_history(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let status_str: String = row.get(4)?;
    let findings_json: String = row.get(8)?;
    let changes_json: String = row.get(9)?;
    let config_json: String = row.get(14)?;
    let sources_json: String = row.get(15)?;

    Ok(HistoryRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        executed_at: row.get(2)?,
        duration_secs: row.get(3)?,
        status: RunStatus::parse(&status_str).map_err(|e| text_column_err(4, e.to_string()))?,
        error_message: row.get(5)?,
        report_text: row.get(6)?,
        summary: row.get(7)?,
        key_findings: serde_json::from_str(&findings_json).unwrap_or_default(),
        key_changes: serde_json::from_str(&changes_json).unwrap_or_default(),
        sources_count: row.get(10)?,
        tokens_used: row.get(11)?,
        trend_score: row.get(12)?,
        sentiment_score: row.get(13)?,
        research_config: serde_json::from_str(&config_json)
            .unwrap_or(serde_json::Value::Null),
        sources_used: serde_json::from_str(&sources_json).unwrap_or_default(),
    })
}

fn row_to_trend(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrendRecord> {
    let trends_json: String = row.get(3)?;
    let evolution_json: String = row.get(5)?;
    let new_topics_json: String = row.get(6)?;
    let emerging_json: String = row.get(7)?;

    Ok(TrendRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        analyzed_at: row.get(2)?,
        keyword_trends: serde_json::from_str(&trends_json).unwrap_or_default(),
        sentiment_change: row.get(4)?,
        topic_evolution: serde_json::from_str(&evolution_json).unwrap_or_default(),
        new_topics: serde_json::from_str(&new_topics_json).unwrap_or_default(),
        emerging_keywords: serde_json::from_str(&emerging_json).unwrap_or_default(),
        activity_level: row.get(8)?,
        change_magnitude: row.get(9)?,
        confidence_score: row.get(10)?,
        anomaly_detected: row.get(11)?,
        anomaly_description: row.get(12)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::types::new_id;
    use super::*;

    fn temp_store() -> (tempfile::TempDir, WatchStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = WatchStore::open(dir.path()).expect("open store");
        (dir, store)
    }

    fn sample_task() -> WatchTask {
        WatchTask::new("local", "AI trends", 24)
            .with_keywords(vec!["AI".into(), "ML".into()])
    }

    fn sample_history(task_id: &str, status: RunStatus) -> HistoryRecord {
        HistoryRecord {
            id: new_id("hist"),
            task_id: task_id.to_owned(),
            executed_at: now_epoch_secs(),
            duration_secs: 1.5,
            status,
            error_message: None,
            report_text: "full report text about AI and ML".to_owned(),
            summary: "summary text".to_owned(),
            key_findings: vec!["finding".to_owned()],
            key_changes: vec![],
            sources_count: 3,
            tokens_used: 1200,
            trend_score: Some(1.0),
            sentiment_score: Some(0.2),
            research_config: serde_json::json!({"tier": "basic"}),
            sources_used: vec!["https://example.com".to_owned()],
        }
    }

    #[test]
    fn create_and_get_round_trip() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        store.create_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap();
        assert_eq!(loaded.topic, "AI trends");
        assert_eq!(loaded.keywords, vec!["AI", "ML"]);
        assert_eq!(loaded.interval_hours, 24);
        assert_eq!(loaded.analysis_depth, AnalysisDepth::Basic);
        assert!(loaded.is_active);
    }

    #[test]
    fn create_rejects_invalid_task() {
        let (_dir, store) = temp_store();
        let task = WatchTask::new("local", "AI", 0);
        assert!(matches!(
            store.create_task(&task),
            Err(FaireError::Configuration(_))
        ));
    }

    #[test]
    fn get_missing_task_is_not_found() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.get_task("task_missing"),
            Err(FaireError::NotFound(_))
        ));
    }

    #[test]
    fn list_filters_by_owner_and_activity() {
        let (_dir, store) = temp_store();
        let a = WatchTask::new("alice", "topic a", 12);
        let mut b = WatchTask::new("bob", "topic b", 12);
        b.is_active = false;
        store.create_task(&a).unwrap();
        store.create_task(&b).unwrap();

        assert_eq!(store.list_tasks(None, false).unwrap().len(), 2);
        assert_eq!(store.list_tasks(Some("alice"), false).unwrap().len(), 1);
        assert_eq!(store.list_tasks(None, true).unwrap().len(), 1);
        assert!(store.list_tasks(Some("carol"), false).unwrap().is_empty());
    }

    #[test]
    fn update_changes_config_fields() {
        let (_dir, store) = temp_store();
        let mut task = sample_task();
        store.create_task(&task).unwrap();

        task.topic = "quantum".to_owned();
        task.interval_hours = 6;
        store.update_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap();
        assert_eq!(loaded.topic, "quantum");
        assert_eq!(loaded.interval_hours, 6);
    }

    #[test]
    fn delete_task_removes_children() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        store.create_task(&task).unwrap();
        store
            .record_execution(&sample_history(&task.id, RunStatus::Success), None)
            .unwrap();

        store.delete_task(&task.id).unwrap();
        assert!(store.get_task(&task.id).is_err());
        let page = store.history_page(&task.id, 1, 10).unwrap();
        assert_eq!(page.total, 0);

        // Second delete reports NotFound.
        assert!(matches!(
            store.delete_task(&task.id),
            Err(FaireError::NotFound(_))
        ));
    }

    #[test]
    fn record_execution_advances_counters() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        store.create_task(&task).unwrap();

        store
            .record_execution(&sample_history(&task.id, RunStatus::Success), None)
            .unwrap();
        store
            .record_execution(&sample_history(&task.id, RunStatus::Partial), None)
            .unwrap();
        store
            .record_execution(&sample_history(&task.id, RunStatus::Failed), None)
            .unwrap();

        let loaded = store.get_task(&task.id).unwrap();
        assert_eq!(loaded.total_runs, 3);
        assert_eq!(loaded.success_runs, 2, "partial counts toward success");
        assert_eq!(loaded.failed_runs, 1);
        assert!(loaded.last_run.is_some());
        assert!(loaded.next_run.is_none(), "on-demand runs leave cadence");
    }

    #[test]
    fn record_execution_sets_next_run_for_periodic() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        store.create_task(&task).unwrap();

        let next = now_epoch_secs() + task.interval_secs();
        store
            .record_execution(&sample_history(&task.id, RunStatus::Success), Some(next))
            .unwrap();

        let loaded = store.get_task(&task.id).unwrap();
        assert_eq!(loaded.next_run, Some(next));
    }

    #[test]
    fn history_page_is_newest_first() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        store.create_task(&task).unwrap();

        for i in 0..5 {
            let mut record = sample_history(&task.id, RunStatus::Success);
            record.executed_at = 1_000 + i;
            record.summary = format!("run {i}");
            store.record_execution(&record, None).unwrap();
        }

        let page = store.history_page(&task.id, 1, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].summary, "run 4");
        assert_eq!(page.items[1].summary, "run 3");

        let last = store.history_page(&task.id, 3, 2).unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].summary, "run 0");
    }

    #[test]
    fn recent_successes_excludes_failed() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        store.create_task(&task).unwrap();

        let mut ok = sample_history(&task.id, RunStatus::Success);
        ok.executed_at = 100;
        let mut partial = sample_history(&task.id, RunStatus::Partial);
        partial.executed_at = 200;
        let mut failed = sample_history(&task.id, RunStatus::Failed);
        failed.executed_at = 300;
        store.record_execution(&ok, None).unwrap();
        store.record_execution(&partial, None).unwrap();
        store.record_execution(&failed, None).unwrap();

        let recent = store.recent_successes(&task.id, 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, RunStatus::Partial);
        assert_eq!(recent[1].status, RunStatus::Success);
    }

    #[test]
    fn trends_since_is_chronological() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        store.create_task(&task).unwrap();
        let now = now_epoch_secs();

        for (i, offset) in [3 * 86_400, 86_400, 0].iter().enumerate() {
            let record = TrendRecord {
                id: new_id("trend"),
                task_id: task.id.clone(),
                analyzed_at: now - offset,
                keyword_trends: Default::default(),
                sentiment_change: 0.0,
                topic_evolution: Default::default(),
                new_topics: vec![],
                emerging_keywords: vec![],
                activity_level: i as f64,
                change_magnitude: 0.0,
                confidence_score: 0.5,
                anomaly_detected: false,
                anomaly_description: None,
            };
            store.append_trend(&record).unwrap();
        }

        let within_two_days = store.trends_since(&task.id, 2).unwrap();
        assert_eq!(within_two_days.len(), 2);
        assert!(within_two_days[0].analyzed_at <= within_two_days[1].analyzed_at);

        let all = store.trends_since(&task.id, 30).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn task_statistics_rollup() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        store.create_task(&task).unwrap();

        let mut ok = sample_history(&task.id, RunStatus::Success);
        ok.trend_score = Some(2.0);
        let mut failed = sample_history(&task.id, RunStatus::Failed);
        failed.trend_score = Some(4.0);
        failed.error_message = Some("engine unreachable".to_owned());
        store.record_execution(&ok, None).unwrap();
        store.record_execution(&failed, None).unwrap();

        let stats = store.task_statistics(&task.id).unwrap();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.successful_executions, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.average_trend_score, Some(3.0));
        assert_eq!(stats.last_error.as_deref(), Some("engine unreachable"));
    }

    #[test]
    fn owner_statistics_rollup() {
        let (_dir, store) = temp_store();
        let active = WatchTask::new("alice", "a", 24);
        let mut paused = WatchTask::new("alice", "b", 24);
        paused.is_active = false;
        store.create_task(&active).unwrap();
        store.create_task(&paused).unwrap();
        store
            .record_execution(&sample_history(&active.id, RunStatus::Success), None)
            .unwrap();

        let stats = store.owner_statistics("alice").unwrap();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.active_tasks, 1);
        assert_eq!(stats.inactive_tasks, 1);
        assert_eq!(stats.total_executions, 1);
        assert!((stats.overall_success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn due_tasks_only_returns_elapsed_active() {
        let (_dir, store) = temp_store();
        let now = now_epoch_secs();

        let mut due = WatchTask::new("local", "due", 1);
        due.next_run = Some(now - 10);
        let mut future = WatchTask::new("local", "future", 1);
        future.next_run = Some(now + 3_600);
        let mut paused = WatchTask::new("local", "paused", 1);
        paused.next_run = Some(now - 10);
        paused.is_active = false;
        store.create_task(&due).unwrap();
        store.create_task(&future).unwrap();
        store.create_task(&paused).unwrap();

        let ready = store.due_tasks(now).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].topic, "due");
    }

    #[test]
    fn set_active_toggles_and_clears_next_run() {
        let (_dir, store) = temp_store();
        let mut task = sample_task();
        task.next_run = Some(now_epoch_secs() + 100);
        store.create_task(&task).unwrap();

        store.set_active(&task.id, false, None).unwrap();
        let paused = store.get_task(&task.id).unwrap();
        assert!(!paused.is_active);
        assert!(paused.next_run.is_none());

        let resume_at = now_epoch_secs() + 500;
        store.set_active(&task.id, true, Some(resume_at)).unwrap();
        let resumed = store.get_task(&task.id).unwrap();
        assert!(resumed.is_active);
        assert_eq!(resumed.next_run, Some(resume_at));
    }
}
