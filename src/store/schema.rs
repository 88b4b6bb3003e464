//! SQLite DDL definitions for the faire store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Complete DDL for the faire database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Enforce foreign key constraints (needed for cascade deletes below).
PRAGMA foreign_keys = ON;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Watched topics, mirrors WatchTask fields.
CREATE TABLE IF NOT EXISTS tasks (
    id                     TEXT PRIMARY KEY,
    owner_id               TEXT NOT NULL DEFAULT 'local',
    topic                  TEXT NOT NULL,
    keywords               TEXT NOT NULL DEFAULT '[]',  -- JSON array of strings
    interval_hours         INTEGER NOT NULL,
    is_active              INTEGER NOT NULL DEFAULT 1,
    next_run               INTEGER,             -- epoch secs, NULL while paused
    analysis_depth         TEXT NOT NULL DEFAULT 'basic',
    source_types           TEXT NOT NULL DEFAULT '["web"]',
    max_sources            INTEGER NOT NULL DEFAULT 10,
    notification_threshold REAL NOT NULL DEFAULT 7.0,
    total_runs             INTEGER NOT NULL DEFAULT 0,
    success_runs           INTEGER NOT NULL DEFAULT 0,
    failed_runs            INTEGER NOT NULL DEFAULT 0,
    created_at             INTEGER NOT NULL DEFAULT 0,
    updated_at             INTEGER NOT NULL DEFAULT 0,
    last_run               INTEGER
);

CREATE INDEX IF NOT EXISTS idx_tasks_owner    ON tasks(owner_id);
CREATE INDEX IF NOT EXISTS idx_tasks_active   ON tasks(is_active);
CREATE INDEX IF NOT EXISTS idx_tasks_next_run ON tasks(next_run);

-- One row per execution attempt, append-only. Mirrors HistoryRecord.
CREATE TABLE IF NOT EXISTS history (
    id              TEXT PRIMARY KEY,
    task_id         TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    executed_at     INTEGER NOT NULL,
    duration_secs   REAL NOT NULL DEFAULT 0,
    status          TEXT NOT NULL,       -- success | failed | partial
    error_message   TEXT,
    report_text     TEXT NOT NULL DEFAULT '',
    summary         TEXT NOT NULL DEFAULT '',
    key_findings    TEXT NOT NULL DEFAULT '[]',  -- JSON array
    key_changes     TEXT NOT NULL DEFAULT '[]',  -- JSON array
    sources_count   INTEGER NOT NULL DEFAULT 0,
    tokens_used     INTEGER NOT NULL DEFAULT 0,
    trend_score     REAL,
    sentiment_score REAL,
    research_config TEXT NOT NULL DEFAULT '{}',  -- JSON snapshot
    sources_used    TEXT NOT NULL DEFAULT '[]'   -- JSON array
);

CREATE INDEX IF NOT EXISTS idx_history_task_time ON history(task_id, executed_at);
CREATE INDEX IF NOT EXISTS idx_history_status    ON history(status);

-- One row per analyzed run, append-only. Mirrors TrendRecord.
CREATE TABLE IF NOT EXISTS trends (
    id                  TEXT PRIMARY KEY,
    task_id             TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    analyzed_at         INTEGER NOT NULL,
    keyword_trends      TEXT NOT NULL DEFAULT '{}',  -- JSON map keyword -> score
    sentiment_change    REAL NOT NULL DEFAULT 0,
    topic_evolution     TEXT NOT NULL DEFAULT '{}',  -- JSON TopicEvolution
    new_topics          TEXT NOT NULL DEFAULT '[]',  -- JSON array
    emerging_keywords   TEXT NOT NULL DEFAULT '[]',  -- JSON array
    activity_level      REAL NOT NULL DEFAULT 0,
    change_magnitude    REAL NOT NULL DEFAULT 0,
    confidence_score    REAL NOT NULL DEFAULT 0,
    anomaly_detected    INTEGER NOT NULL DEFAULT 0,
    anomaly_description TEXT
);

CREATE INDEX IF NOT EXISTS idx_trends_task_time ON trends(task_id, analyzed_at);

"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times. Inserts the current schema version into
/// `schema_meta` if not already present.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Seed schema version if this is a fresh database.
    let version_str = super::types::CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the current schema version from the database.
///
/// Returns `None` if the `schema_meta` table is empty or the key is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_schema_creates_tables() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"tasks".to_owned()));
        assert!(tables.contains(&"history".to_owned()));
        assert!(tables.contains(&"trends".to_owned()));
        assert!(tables.contains(&"schema_meta".to_owned()));
    }

    #[test]
    fn apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");
        apply_schema(&conn).expect("second apply_schema (idempotent)");
    }

    #[test]
    fn schema_version_is_seeded() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");

        let version = read_schema_version(&conn)
            .expect("read_schema_version")
            .expect("version should exist");

        assert_eq!(version, super::super::types::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn schema_version_not_overwritten_on_reapply() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply");

        // Manually bump the version to simulate a future migration.
        conn.execute(
            "UPDATE schema_meta SET value = '999' WHERE key = 'schema_version'",
            [],
        )
        .expect("bump version");

        apply_schema(&conn).expect("second apply");

        let version = read_schema_version(&conn)
            .expect("read")
            .expect("version exists");
        assert_eq!(version, 999);
    }

    #[test]
    fn deleting_task_cascades_history_and_trends() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");

        conn.execute(
            "INSERT INTO tasks (id, topic, interval_hours) VALUES ('t1', 'AI', 24)",
            [],
        )
        .expect("insert task");
        conn.execute(
            "INSERT INTO history (id, task_id, executed_at, status) VALUES ('h1', 't1', 100, 'success')",
            [],
        )
        .expect("insert history");
        conn.execute(
            "INSERT INTO trends (id, task_id, analyzed_at, activity_level, change_magnitude, confidence_score, anomaly_detected) VALUES ('r1', 't1', 100, 5.0, 0.0, 0.3, 0)",
            [],
        )
        .expect("insert trend");

        conn.execute("DELETE FROM tasks WHERE id = 't1'", [])
            .expect("delete task");

        let history_left: i64 = conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .expect("count history");
        let trends_left: i64 = conn
            .query_row("SELECT COUNT(*) FROM trends", [], |row| row.get(0))
            .expect("count trends");
        assert_eq!(history_left, 0);
        assert_eq!(trends_left, 0);
    }
}
