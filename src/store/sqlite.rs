// src/store/sqlite.rs

//! SQLite-backed shared store.
//!
//! Any number of worker processes may point at the same database file; the
//! claim protocol relies only on SQLite's own transactional guarantees. The
//! load-bearing statement is the conditional `UPDATE … WHERE id = ? AND
//! status = 'waiting'`: it either wins the row atomically or changes zero
//! rows, in which case the claimer simply moves on to the next oldest item.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so lexicographic comparison in SQL matches
//! chronological order.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::errors::{EvoqueueError, Result};
use crate::search::candidate::{Candidate, Fingerprint};
use crate::store::{
    CandidateStore, CandidateTotals, EnqueueRequest, QueuePolicy, TagFilter, WorkItem,
    WorkOutcome, WorkPayload, WorkQueue,
};
use crate::types::{WorkItemId, WorkStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS work_items (
    id               TEXT PRIMARY KEY,
    candidate_id     TEXT NOT NULL,
    source           TEXT NOT NULL,
    payload          TEXT NOT NULL,
    status           TEXT NOT NULL,
    claimed_by       TEXT,
    failure_count    INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    finished_at      TEXT,
    lease_expires_at TEXT,
    result_data      TEXT,
    failure_reason   TEXT
);
CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status);
CREATE INDEX IF NOT EXISTS idx_work_items_created_at ON work_items(created_at);
CREATE INDEX IF NOT EXISTS idx_work_items_source ON work_items(source);

CREATE TABLE IF NOT EXISTS work_item_tags (
    item_id TEXT NOT NULL,
    tag     TEXT NOT NULL,
    PRIMARY KEY (item_id, tag)
);
CREATE INDEX IF NOT EXISTS idx_work_item_tags_tag ON work_item_tags(tag);

CREATE TABLE IF NOT EXISTS candidates (
    id           TEXT PRIMARY KEY,
    fingerprint  TEXT NOT NULL,
    fitness      REAL,
    source       TEXT NOT NULL,
    parents      TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    evaluated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_candidates_fitness ON candidates(fitness);
"#;

/// Shared store on a SQLite database file.
///
/// Each operation opens its own connection, mirroring how independent
/// worker processes access the file; nothing is cached in memory between
/// calls, so every component reconstructs its view from the store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    policy: QueuePolicy,
}

impl SqliteStore {
    /// Open (creating the schema if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>, policy: QueuePolicy) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            policy,
        };
        let conn = store.conn()?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %store.path.display(), "opened sqlite store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(StdDuration::from_secs(30))?;
        Ok(conn)
    }
}

fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| anyhow::anyhow!("invalid stored timestamp {s:?}: {e}").into())
}

fn status_from_sql(s: &str) -> Result<WorkStatus> {
    s.parse::<WorkStatus>()
        .map_err(|e| anyhow::anyhow!("{e}").into())
}

struct ItemRow {
    id: String,
    candidate_id: String,
    source: String,
    payload: String,
    status: String,
    claimed_by: Option<String>,
    failure_count: i64,
    created_at: String,
    finished_at: Option<String>,
    lease_expires_at: Option<String>,
    result_data: Option<String>,
    failure_reason: Option<String>,
}

const ITEM_COLUMNS: &str = "id, candidate_id, source, payload, status, claimed_by, \
     failure_count, created_at, finished_at, lease_expires_at, result_data, failure_reason";

fn item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        candidate_id: row.get(1)?,
        source: row.get(2)?,
        payload: row.get(3)?,
        status: row.get(4)?,
        claimed_by: row.get(5)?,
        failure_count: row.get(6)?,
        created_at: row.get(7)?,
        finished_at: row.get(8)?,
        lease_expires_at: row.get(9)?,
        result_data: row.get(10)?,
        failure_reason: row.get(11)?,
    })
}

fn load_item(conn: &Connection, id: &str) -> Result<Option<WorkItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM work_items WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], item_row)
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt =
        conn.prepare("SELECT tag FROM work_item_tags WHERE item_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map(params![id], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let payload: WorkPayload = serde_json::from_str(&row.payload)?;
    let result_data = match row.result_data {
        Some(s) => Some(serde_json::from_str(&s)?),
        None => None,
    };

    Ok(Some(WorkItem {
        id: row.id,
        candidate: row.candidate_id,
        source: row.source,
        payload,
        status: status_from_sql(&row.status)?,
        tags,
        claimed_by: row.claimed_by,
        failure_count: row.failure_count as u32,
        created_at: ts_from_sql(&row.created_at)?,
        finished_at: row.finished_at.as_deref().map(ts_from_sql).transpose()?,
        lease_expires_at: row
            .lease_expires_at
            .as_deref()
            .map(ts_from_sql)
            .transpose()?,
        result_data,
        failure_reason: row.failure_reason,
    }))
}

impl WorkQueue for SqliteStore {
    fn enqueue(&self, request: EnqueueRequest) -> Result<WorkItemId> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let id = uuid::Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&request.payload)?;
        let now = ts_to_sql(&Utc::now());

        tx.execute(
            "INSERT INTO work_items \
             (id, candidate_id, source, payload, status, failure_count, created_at) \
             VALUES (?1, ?2, ?3, ?4, 'waiting', ?5, ?6)",
            params![
                id,
                request.payload.candidate,
                request.payload.source,
                payload,
                request.failure_count,
                now
            ],
        )?;
        for tag in &request.tags {
            tx.execute(
                "INSERT OR IGNORE INTO work_item_tags (item_id, tag) VALUES (?1, ?2)",
                params![id, tag],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    fn claim(&self, worker: &str, filter: &TagFilter) -> Result<Option<WorkItem>> {
        let conn = self.conn()?;
        let lease = self
            .policy
            .claim_lease
            .map(|d| ts_to_sql(&(Utc::now() + d)));

        loop {
            let picked: Option<String> = if filter.is_any() {
                conn.query_row(
                    "SELECT id FROM work_items WHERE status = 'waiting' \
                     ORDER BY created_at ASC, rowid ASC LIMIT 1",
                    [],
                    |r| r.get(0),
                )
                .optional()?
            } else {
                let placeholders = vec!["?"; filter.tags().len()].join(", ");
                let sql = format!(
                    "SELECT w.id FROM work_items w WHERE w.status = 'waiting' \
                     AND EXISTS (SELECT 1 FROM work_item_tags t \
                                 WHERE t.item_id = w.id AND t.tag IN ({placeholders})) \
                     ORDER BY w.created_at ASC, w.rowid ASC LIMIT 1"
                );
                conn.query_row(&sql, rusqlite::params_from_iter(filter.tags()), |r| {
                    r.get(0)
                })
                .optional()?
            };

            let Some(id) = picked else {
                return Ok(None);
            };

            // Conditional update: either this caller wins the row or nobody
            // loses anything. Zero rows changed means another claimer got
            // there first; retry with the next oldest item.
            let changed = conn.execute(
                "UPDATE work_items SET status = 'claimed', claimed_by = ?1, \
                 lease_expires_at = ?2 WHERE id = ?3 AND status = 'waiting'",
                params![worker, lease, id],
            )?;
            if changed == 1 {
                debug!(item = %id, worker = %worker, "claimed work item");
                return load_item(&conn, &id);
            }
        }
    }

    fn mark_running(&self, item: &str, worker: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE work_items SET status = 'running' \
             WHERE id = ?1 AND claimed_by = ?2 AND status = 'claimed'",
            params![item, worker],
        )?;
        if changed == 0 {
            return Err(EvoqueueError::NotOwned {
                item: item.to_string(),
                worker: worker.to_string(),
            });
        }
        Ok(())
    }

    fn complete(&self, item: &str, worker: &str, outcome: WorkOutcome) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = ts_to_sql(&Utc::now());

        let (result_data, failure_reason, fitness) = match &outcome {
            WorkOutcome::Succeeded {
                fitness,
                result_data,
            } => (
                Some(serde_json::to_string(result_data)?),
                None,
                Some(*fitness),
            ),
            WorkOutcome::Failed { reason } | WorkOutcome::Canceled { reason } => {
                (None, Some(reason.clone()), None)
            }
        };

        let changed = tx.execute(
            "UPDATE work_items SET status = ?1, finished_at = ?2, \
             result_data = ?3, failure_reason = ?4 \
             WHERE id = ?5 AND claimed_by = ?6 AND status IN ('claimed', 'running')",
            params![
                outcome.status().as_str(),
                now,
                result_data,
                failure_reason,
                item,
                worker
            ],
        )?;
        if changed == 0 {
            return Err(EvoqueueError::NotOwned {
                item: item.to_string(),
                worker: worker.to_string(),
            });
        }

        // Record the candidate's fitness in the same transaction that
        // closes the item: either both land or neither does.
        if let Some(fitness) = fitness {
            tx.execute(
                "UPDATE candidates SET fitness = ?1, evaluated_at = ?2 \
                 WHERE id = (SELECT candidate_id FROM work_items WHERE id = ?3) \
                 AND fitness IS NULL",
                params![fitness, now, item],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn release_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now_sql = ts_to_sql(&now);

        let canceled = tx.execute(
            "UPDATE work_items SET status = 'canceled', finished_at = ?1, \
             failure_reason = 'claim lease expired; retry budget spent', \
             claimed_by = NULL, lease_expires_at = NULL \
             WHERE status IN ('claimed', 'running') \
             AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?1 \
             AND failure_count + 1 >= ?2",
            params![now_sql, self.policy.retry_limit],
        )?;
        let released = tx.execute(
            "UPDATE work_items SET status = 'waiting', claimed_by = NULL, \
             lease_expires_at = NULL, failure_count = failure_count + 1 \
             WHERE status IN ('claimed', 'running') \
             AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?1",
            params![now_sql],
        )?;
        tx.commit()?;

        if canceled + released > 0 {
            debug!(canceled, released, "released expired claims");
        }
        Ok(canceled + released)
    }

    fn work_item(&self, item: &str) -> Result<Option<WorkItem>> {
        let conn = self.conn()?;
        load_item(&conn, item)
    }

    fn in_flight_count(&self, source: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM work_items WHERE source = ?1 \
             AND status IN ('waiting', 'claimed', 'running')",
            params![source],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    fn in_flight_total(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM work_items \
             WHERE status IN ('waiting', 'claimed', 'running')",
            [],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    fn active_total(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM work_items WHERE status IN ('claimed', 'running')",
            [],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}

fn candidate_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, Option<f64>, String, String, String, Option<String>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

const CANDIDATE_COLUMNS: &str =
    "id, fingerprint, fitness, source, parents, created_at, evaluated_at";

fn candidate_from_row(
    (id, fingerprint, fitness, source, parents, created_at, evaluated_at): (
        String,
        String,
        Option<f64>,
        String,
        String,
        String,
        Option<String>,
    ),
) -> Result<Candidate> {
    Ok(Candidate {
        id,
        fingerprint: serde_json::from_str(&fingerprint)?,
        fitness,
        source,
        parents: serde_json::from_str(&parents)?,
        created_at: ts_from_sql(&created_at)?,
        evaluated_at: evaluated_at.as_deref().map(ts_from_sql).transpose()?,
    })
}

impl CandidateStore for SqliteStore {
    fn insert_candidate(&self, candidate: &Candidate) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO candidates \
             (id, fingerprint, fitness, source, parents, created_at, evaluated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                candidate.id,
                serde_json::to_string(&candidate.fingerprint)?,
                candidate.fitness,
                candidate.source,
                serde_json::to_string(&candidate.parents)?,
                ts_to_sql(&candidate.created_at),
                candidate.evaluated_at.as_ref().map(ts_to_sql),
            ],
        )?;
        Ok(())
    }

    fn candidate(&self, id: &str) -> Result<Option<Candidate>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1");
        let row = conn.query_row(&sql, params![id], candidate_row).optional()?;
        row.map(candidate_from_row).transpose()
    }

    fn evaluated_population(&self) -> Result<Vec<Candidate>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE fitness IS NOT NULL \
             ORDER BY fitness ASC, evaluated_at ASC, rowid ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], candidate_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(candidate_from_row).collect()
    }

    fn evaluations_in_order(&self) -> Result<Vec<Candidate>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE fitness IS NOT NULL \
             ORDER BY evaluated_at ASC, rowid ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], candidate_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(candidate_from_row).collect()
    }

    fn fingerprints(&self) -> Result<Vec<Fingerprint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT fingerprint FROM candidates")?;
        let rows = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(EvoqueueError::from))
            .collect()
    }

    fn totals(&self) -> Result<CandidateTotals> {
        let conn = self.conn()?;
        let (created, evaluated): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(fitness) FROM candidates",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(CandidateTotals {
            created: created as usize,
            evaluated: evaluated as usize,
        })
    }
}
