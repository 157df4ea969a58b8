// src/storage/sqlite.rs

//! SQLite-backed discovery store.
//!
//! Opens a short-lived connection per operation so one database file can be
//! shared by overlapping runs and operator commands from separate processes.
//! WAL mode plus a busy timeout handles the writer contention that overlap
//! produces.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::{DiscoveryStore, RunControl};
use crate::error::{AppError, Result};
use crate::models::{DiscoveredItem, Run, RunCounters, RunParams, RunStatus};

/// SQLite store for runs and discovered items.
#[derive(Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (and if necessary create) the database at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            db_path: db_path.into(),
        };
        if let Some(parent) = store.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        store.init_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "synchronous", "normal")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            -- One row per pipeline invocation
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_slug TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',

                -- Parameters
                max_items INTEGER,
                date_from TEXT,
                date_to TEXT,

                -- Counters
                discovered INTEGER NOT NULL DEFAULT 0,
                queued INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                errored INTEGER NOT NULL DEFAULT 0,

                -- Cooperative cancellation marker
                cancel_requested INTEGER NOT NULL DEFAULT 0,

                -- Progress and failure context
                cursor TEXT,
                last_error TEXT,

                -- Timing
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );

            -- Durable registry of uniquely known items
            CREATE TABLE IF NOT EXISTS discovered_items (
                id TEXT PRIMARY KEY,
                source_slug TEXT NOT NULL,
                canonical_key TEXT NOT NULL,
                discovery_method TEXT NOT NULL,
                run_id INTEGER,
                discovered_at TEXT NOT NULL,

                UNIQUE(source_slug, canonical_key)
            );

            CREATE INDEX IF NOT EXISTS idx_runs_source
                ON runs(source_slug, created_at);
            CREATE INDEX IF NOT EXISTS idx_items_source
                ON discovered_items(source_slug);
            CREATE INDEX IF NOT EXISTS idx_items_run
                ON discovered_items(run_id);
        "#,
        )?;
        Ok(())
    }

    const RUN_COLUMNS: &'static str = "id, source_slug, status, max_items, date_from, date_to, \
         discovered, queued, skipped, errored, cancel_requested, cursor, last_error, \
         created_at, started_at, finished_at";

    fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRun> {
        Ok(RawRun {
            id: row.get(0)?,
            source_slug: row.get(1)?,
            status: row.get(2)?,
            max_items: row.get(3)?,
            date_from: row.get(4)?,
            date_to: row.get(5)?,
            discovered: row.get(6)?,
            queued: row.get(7)?,
            skipped: row.get(8)?,
            errored: row.get(9)?,
            cancel_requested: row.get(10)?,
            cursor: row.get(11)?,
            last_error: row.get(12)?,
            created_at: row.get(13)?,
            started_at: row.get(14)?,
            finished_at: row.get(15)?,
        })
    }
}

/// Run row as stored, before timestamp and status parsing.
struct RawRun {
    id: i64,
    source_slug: String,
    status: String,
    max_items: Option<i64>,
    date_from: Option<String>,
    date_to: Option<String>,
    discovered: i64,
    queued: i64,
    skipped: i64,
    errored: i64,
    cancel_requested: i64,
    cursor: Option<String>,
    last_error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl RawRun {
    fn into_run(self) -> Result<Run> {
        let status = RunStatus::parse(&self.status)
            .ok_or_else(|| AppError::config(format!("unknown run status '{}'", self.status)))?;
        Ok(Run {
            id: Some(self.id),
            source_slug: self.source_slug,
            status,
            params: RunParams {
                max_items: self.max_items.map(|n| n as u32),
                date_from: parse_date(self.date_from.as_deref())?,
                date_to: parse_date(self.date_to.as_deref())?,
                // Dry runs are never persisted
                dry_run: false,
            },
            counters: RunCounters {
                discovered: self.discovered as u64,
                queued: self.queued as u64,
                skipped: self.skipped as u64,
                errored: self.errored as u64,
                ..RunCounters::default()
            },
            cursor: self.cursor,
            last_error: self.last_error,
            created_at: parse_ts(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_ts).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::config(format!("bad timestamp '{raw}': {e}")))
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        s.parse::<NaiveDate>()
            .map_err(|e| AppError::config(format!("bad date '{s}': {e}")))
    })
    .transpose()
}

impl DiscoveryStore for SqliteStore {
    fn create_run(&self, source_slug: &str, params: &RunParams) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO runs (source_slug, status, max_items, date_from, date_to, created_at)
            VALUES (?1, 'pending', ?2, ?3, ?4, ?5)
            "#,
            params![
                source_slug,
                params.max_items,
                params.date_from.map(|d| d.to_string()),
                params.date_to.map(|d| d.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn mark_running(&self, run_id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE runs SET status = 'running', started_at = ?1 \
             WHERE id = ?2 AND status = 'pending'",
            params![Utc::now().to_rfc3339(), run_id],
        )?;
        Ok(())
    }

    fn checkpoint(
        &self,
        run_id: i64,
        counters: &RunCounters,
        cursor: Option<&str>,
    ) -> Result<RunControl> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE runs SET discovered = ?1, queued = ?2, skipped = ?3, errored = ?4, \
             cursor = ?5 WHERE id = ?6",
            params![
                counters.discovered as i64,
                counters.queued as i64,
                counters.skipped as i64,
                counters.errored as i64,
                cursor,
                run_id,
            ],
        )?;

        let (status, cancel_requested): (String, i64) = conn.query_row(
            "SELECT status, cancel_requested FROM runs WHERE id = ?1",
            params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let status = RunStatus::parse(&status)
            .ok_or_else(|| AppError::config(format!("unknown run status '{status}'")))?;
        Ok(RunControl {
            status,
            cancel_requested: cancel_requested != 0,
        })
    }

    fn finish(
        &self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
        last_error: Option<&str>,
    ) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE runs SET status = ?1, discovered = ?2, queued = ?3, skipped = ?4, \
             errored = ?5, last_error = ?6, finished_at = ?7 \
             WHERE id = ?8 AND status IN ('pending', 'running')",
            params![
                status.as_str(),
                counters.discovered as i64,
                counters.queued as i64,
                counters.skipped as i64,
                counters.errored as i64,
                last_error,
                now,
                run_id,
            ],
        )?;

        if changed == 0 {
            // Already terminal (an operator flipped the status directly):
            // record final counters and timing without touching the status.
            conn.execute(
                "UPDATE runs SET discovered = ?1, queued = ?2, skipped = ?3, errored = ?4, \
                 finished_at = COALESCE(finished_at, ?5) WHERE id = ?6",
                params![
                    counters.discovered as i64,
                    counters.queued as i64,
                    counters.skipped as i64,
                    counters.errored as i64,
                    now,
                    run_id,
                ],
            )?;
        }
        Ok(())
    }

    fn request_cancel(&self, run_id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE runs SET cancel_requested = 1 \
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![run_id],
        )?;
        Ok(changed > 0)
    }

    fn get_run(&self, run_id: i64) -> Result<Option<Run>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", Self::RUN_COLUMNS);
        let raw = conn
            .query_row(&sql, params![run_id], Self::row_to_run)
            .optional()?;
        raw.map(RawRun::into_run).transpose()
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<Run>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            Self::RUN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_run)?;

        let mut runs = Vec::new();
        for raw in rows {
            runs.push(raw?.into_run()?);
        }
        Ok(runs)
    }

    fn item_exists(&self, source_slug: &str, canonical_key: &str) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM discovered_items \
             WHERE source_slug = ?1 AND canonical_key = ?2",
            params![source_slug, canonical_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_item(&self, item: &DiscoveredItem) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO discovered_items (
                id, source_slug, canonical_key, discovery_method, run_id, discovered_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                item.id,
                item.source_slug,
                item.canonical_key,
                item.discovery_method.as_str(),
                item.run_id,
                item.discovered_at.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn item_count(&self, source_slug: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM discovered_items WHERE source_slug = ?1",
            params![source_slug],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscoveryMethod;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> SqliteStore {
        SqliteStore::open(tmp.path().join("test.db")).unwrap()
    }

    fn item(slug: &str, key: &str, run_id: Option<i64>) -> DiscoveredItem {
        DiscoveredItem::backfill(slug, key.to_string(), run_id)
    }

    #[test]
    fn test_create_and_get_run() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let params = RunParams {
            max_items: Some(100),
            date_from: Some("2024-01-01".parse().unwrap()),
            date_to: Some("2024-12-31".parse().unwrap()),
            dry_run: false,
        };
        let id = store.create_run("gazette", &params).unwrap();

        let run = store.get_run(id).unwrap().unwrap();
        assert_eq!(run.id, Some(id));
        assert_eq!(run.source_slug, "gazette");
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.params.max_items, Some(100));
        assert_eq!(run.params.date_from, Some("2024-01-01".parse().unwrap()));
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_get_missing_run() {
        let tmp = TempDir::new().unwrap();
        assert!(store(&tmp).get_run(999).unwrap().is_none());
    }

    #[test]
    fn test_mark_running() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = store.create_run("gazette", &RunParams::default()).unwrap();

        store.mark_running(id).unwrap();
        let run = store.get_run(id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.started_at.is_some());
    }

    #[test]
    fn test_checkpoint_persists_counters_and_reads_cancel() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = store.create_run("gazette", &RunParams::default()).unwrap();
        store.mark_running(id).unwrap();

        let mut counters = RunCounters::default();
        counters.discovered = 5;
        counters.queued = 5;
        let control = store.checkpoint(id, &counters, Some("3")).unwrap();
        assert!(!control.should_cancel());

        let run = store.get_run(id).unwrap().unwrap();
        assert_eq!(run.counters.discovered, 5);
        assert_eq!(run.cursor.as_deref(), Some("3"));

        assert!(store.request_cancel(id).unwrap());
        let control = store.checkpoint(id, &counters, Some("3")).unwrap();
        assert!(control.cancel_requested);
        assert!(control.should_cancel());
    }

    #[test]
    fn test_finish_is_guarded_against_terminal_overwrite() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = store.create_run("gazette", &RunParams::default()).unwrap();
        store.mark_running(id).unwrap();

        let counters = RunCounters {
            discovered: 2,
            queued: 2,
            ..RunCounters::default()
        };
        store
            .finish(id, RunStatus::Completed, &counters, None)
            .unwrap();
        store
            .finish(id, RunStatus::Failed, &counters, Some("late error"))
            .unwrap();

        let run = store.get_run(id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.last_error.is_none());
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_finish_after_external_cancel_keeps_status() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = store.create_run("gazette", &RunParams::default()).unwrap();
        store.mark_running(id).unwrap();

        // Operator flips the status out-of-band.
        let conn = store.connect().unwrap();
        conn.execute(
            "UPDATE runs SET status = 'cancelled' WHERE id = ?1",
            params![id],
        )
        .unwrap();

        let counters = RunCounters {
            discovered: 7,
            ..RunCounters::default()
        };
        store
            .finish(id, RunStatus::Cancelled, &counters, None)
            .unwrap();

        let run = store.get_run(id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.counters.discovered, 7);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_request_cancel_only_for_live_runs() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = store.create_run("gazette", &RunParams::default()).unwrap();
        store.mark_running(id).unwrap();
        store
            .finish(id, RunStatus::Completed, &RunCounters::default(), None)
            .unwrap();

        assert!(!store.request_cancel(id).unwrap());
        assert!(!store.request_cancel(12345).unwrap());
    }

    #[test]
    fn test_insert_item_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let a = item("gazette", "https://g.test/1", Some(1));
        assert!(store.insert_item(&a).unwrap());
        assert!(!store.insert_item(&a).unwrap());
        assert!(store.item_exists("gazette", "https://g.test/1").unwrap());
        assert_eq!(store.item_count("gazette").unwrap(), 1);
    }

    #[test]
    fn test_uniqueness_holds_across_discovery_methods() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let mut feed = item("gazette", "https://g.test/1", None);
        feed.discovery_method = DiscoveryMethod::Feed;
        assert!(store.insert_item(&feed).unwrap());

        // The backfill pipeline later sights the same key
        let backfill = item("gazette", "https://g.test/1", Some(3));
        assert!(!store.insert_item(&backfill).unwrap());
        assert_eq!(store.item_count("gazette").unwrap(), 1);
    }

    #[test]
    fn test_same_key_different_sources() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        assert!(store.insert_item(&item("gazette", "https://g.test/1", None)).unwrap());
        assert!(store.insert_item(&item("diario", "https://g.test/1", None)).unwrap());
        assert_eq!(store.item_count("gazette").unwrap(), 1);
        assert_eq!(store.item_count("diario").unwrap(), 1);
    }

    #[test]
    fn test_rediscovery_after_external_delete() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let a = item("gazette", "https://g.test/1", Some(1));
        assert!(store.insert_item(&a).unwrap());

        // Administrative rollback deletes the run's items out-of-band.
        let conn = store.connect().unwrap();
        conn.execute(
            "DELETE FROM discovered_items WHERE run_id = ?1",
            params![1i64],
        )
        .unwrap();

        let again = item("gazette", "https://g.test/1", Some(2));
        assert!(store.insert_item(&again).unwrap());
    }

    #[test]
    fn test_recent_runs_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let a = store.create_run("gazette", &RunParams::default()).unwrap();
        let b = store.create_run("diario", &RunParams::default()).unwrap();
        let c = store.create_run("gazette", &RunParams::default()).unwrap();

        let runs = store.recent_runs(2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, Some(c));
        assert_eq!(runs[1].id, Some(b));
        assert!(a < b && b < c);
    }
}
