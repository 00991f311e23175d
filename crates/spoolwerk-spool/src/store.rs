// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable print job store backed by SQLite.
//
// The store is the sole source of truth for job status.  A job is committed
// (status `queued`) before admission acknowledges it, so no accepted job is
// lost across a process restart.  Ids are SQLite rowids and therefore
// monotonic in creation order.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, info, instrument};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{JobId, JobStatus, PrintJob, PrintPayload};

/// SQLite schema for the jobs table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS print_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        payload TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// A typed partial update for one job row.
///
/// `None` fields are left untouched.  `last_error` is tri-state: `None`
/// leaves the column alone, `Some(Some(_))` sets it, `Some(None)` clears it.
/// `updated_at` is always refreshed.
#[derive(Debug, Default)]
pub struct JobUpdate<'a> {
    pub status: Option<JobStatus>,
    pub attempts: Option<u32>,
    pub last_error: Option<Option<&'a str>>,
}

/// Persistent job store backed by a SQLite database.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively.  The connection is `Send` but not `Sync`; the service layer
/// wraps the store in `Arc<Mutex<_>>` so every call is serialized.
pub struct JobStore {
    /// The open SQLite connection.
    conn: Connection,
}

impl JobStore {
    /// Open (or create) the job database at the given path.
    ///
    /// Applies WAL journal mode and creates the `print_jobs` table if it
    /// does not exist.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| SpoolError::Database(format!("open: {e}")))?;

        // WAL mode survives unclean shutdowns more gracefully and allows
        // concurrent readers while the dispatcher writes.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| SpoolError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| SpoolError::Database(format!("create table: {e}")))?;

        info!("job database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SpoolError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| SpoolError::Database(format!("create table: {e}")))?;

        debug!("in-memory job database opened");
        Ok(Self { conn })
    }

    /// Persist a new job with status `queued` and zero attempts.
    ///
    /// The insert is committed before this returns, so the caller may
    /// acknowledge the job as accepted.
    #[instrument(skip_all)]
    pub fn insert(&self, payload: &PrintPayload) -> Result<JobId> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| SpoolError::Database(format!("serialize payload: {e}")))?;
        let now = Utc::now().timestamp();

        self.conn
            .execute(
                "INSERT INTO print_jobs (payload, status, attempts, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?3)",
                params![payload_json, JobStatus::Queued.as_str(), now],
            )
            .map_err(|e| SpoolError::Database(format!("insert job: {e}")))?;

        let id = JobId(self.conn.last_insert_rowid());
        info!(job_id = %id, "job inserted");
        Ok(id)
    }

    /// Retrieve a single job by its id.
    ///
    /// Returns `None` if the job does not exist.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn get(&self, id: JobId) -> Result<Option<PrintJob>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, payload, status, attempts, last_error, created_at, updated_at
                 FROM print_jobs WHERE id = ?1",
            )
            .map_err(|e| SpoolError::Database(format!("prepare get: {e}")))?;

        let mut rows = stmt
            .query_map(params![id.0], row_to_job)
            .map_err(|e| SpoolError::Database(format!("query get: {e}")))?;

        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(SpoolError::Database(format!("row parse: {e}"))),
            None => Ok(None),
        }
    }

    /// Apply a typed partial update to an existing job.
    ///
    /// Always refreshes `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::NotFound`] if the row does not exist.
    #[instrument(skip(self, update), fields(job_id = %id))]
    pub fn update(&self, id: JobId, update: &JobUpdate<'_>) -> Result<()> {
        let mut sets = vec!["updated_at = ?"];
        let mut values = vec![Value::Integer(Utc::now().timestamp())];

        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().into()));
        }
        if let Some(attempts) = update.attempts {
            sets.push("attempts = ?");
            values.push(Value::Integer(i64::from(attempts)));
        }
        if let Some(last_error) = &update.last_error {
            sets.push("last_error = ?");
            values.push(match last_error {
                Some(message) => Value::Text((*message).into()),
                None => Value::Null,
            });
        }

        let sql = format!("UPDATE print_jobs SET {} WHERE id = ?", sets.join(", "));
        values.push(Value::Integer(id.0));

        let rows = self
            .conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| SpoolError::Database(format!("update job: {e}")))?;

        if rows == 0 {
            return Err(SpoolError::NotFound(id));
        }

        debug!(job_id = %id, status = ?update.status, "job updated");
        Ok(())
    }

    /// Retrieve jobs ordered by creation time, newest first, bounded by
    /// `limit`.
    #[instrument(skip(self))]
    pub fn list(&self, limit: u32) -> Result<Vec<PrintJob>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, payload, status, attempts, last_error, created_at, updated_at
                 FROM print_jobs ORDER BY created_at DESC, id DESC LIMIT ?1",
            )
            .map_err(|e| SpoolError::Database(format!("prepare list: {e}")))?;

        let jobs = stmt
            .query_map(params![limit], row_to_job)
            .map_err(|e| SpoolError::Database(format!("query list: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SpoolError::Database(format!("collect rows: {e}")))?;

        debug!(count = jobs.len(), "listed jobs");
        Ok(jobs)
    }

    /// Ids of every job whose status is `queued` or `error`, ascending by
    /// creation time.  Used by startup recovery to re-populate the work
    /// queue.
    ///
    /// Jobs left `processing` by a crash are intentionally not returned --
    /// an interrupted in-flight delivery needs a reprint or manual
    /// intervention.
    #[instrument(skip(self))]
    pub fn pending_ids(&self) -> Result<Vec<JobId>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM print_jobs WHERE status IN ('queued', 'error')
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| SpoolError::Database(format!("prepare pending: {e}")))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0).map(JobId))
            .map_err(|e| SpoolError::Database(format!("query pending: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SpoolError::Database(format!("collect ids: {e}")))?;

        debug!(count = ids.len(), "pending ids fetched");
        Ok(ids)
    }

    /// Number of jobs that are queued or mid-dispatch.
    pub fn pending_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM print_jobs WHERE status IN ('queued', 'processing')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| SpoolError::Database(format!("count pending: {e}")))?;
        Ok(count as u64)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a SQLite row to a `PrintJob`.
///
/// Column indices must match the SELECT order used in the query methods
/// above.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrintJob> {
    let id: i64 = row.get(0)?;
    let payload_json: String = row.get(1)?;
    let status_text: String = row.get(2)?;
    let attempts: u32 = row.get::<_, i64>(3)? as u32;
    let last_error: Option<String> = row.get(4)?;
    let created_at: i64 = row.get(5)?;
    let updated_at: i64 = row.get(6)?;

    let payload: PrintPayload = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status = JobStatus::from_str(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown status {status_text:?}").into(),
        )
    })?;

    Ok(PrintJob {
        id: JobId(id),
        payload,
        status,
        attempts,
        last_error,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spoolwerk_core::types::{PayloadBody, PrinterTarget};

    /// Helper: a minimal text payload.
    fn text_payload(text: &str) -> PrintPayload {
        PrintPayload {
            body: PayloadBody::Text(text.into()),
            printer: None,
        }
    }

    #[test]
    fn insert_and_retrieve_job() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let id = store.insert(&text_payload("hello")).expect("insert");

        let job = store.get(id).expect("get").expect("found");
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.last_error.is_none());
        assert_eq!(job.payload, text_payload("hello"));
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn payload_with_target_round_trips() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let payload = PrintPayload {
            body: PayloadBody::RawBase64("aGVsbG8=".into()),
            printer: Some(PrinterTarget {
                host: "192.168.1.50".into(),
                port: Some(9100),
            }),
        };
        let id = store.insert(&payload).expect("insert");

        let job = store.get(id).expect("get").expect("found");
        assert_eq!(job.payload, payload);
    }

    #[test]
    fn ids_are_monotonic() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let first = store.insert(&text_payload("a")).expect("insert");
        let second = store.insert(&text_payload("b")).expect("insert");
        assert!(second > first);
    }

    #[test]
    fn partial_update_touches_only_named_fields() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let id = store.insert(&text_payload("x")).expect("insert");

        store
            .update(
                id,
                &JobUpdate {
                    status: Some(JobStatus::Error),
                    attempts: Some(1),
                    last_error: Some(Some("connection refused")),
                },
            )
            .expect("update");

        // Status-only update must leave attempts and last_error alone.
        store
            .update(
                id,
                &JobUpdate {
                    status: Some(JobStatus::Queued),
                    ..Default::default()
                },
            )
            .expect("update");

        let job = store.get(id).expect("get").expect("found");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn clearing_last_error_writes_null() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let id = store.insert(&text_payload("x")).expect("insert");

        store
            .update(
                id,
                &JobUpdate {
                    status: Some(JobStatus::Error),
                    last_error: Some(Some("boom")),
                    ..Default::default()
                },
            )
            .expect("update");
        store
            .update(
                id,
                &JobUpdate {
                    status: Some(JobStatus::Done),
                    last_error: Some(None),
                    ..Default::default()
                },
            )
            .expect("update");

        let job = store.get(id).expect("get").expect("found");
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.last_error.is_none());
    }

    #[test]
    fn update_nonexistent_job_fails_loudly() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let result = store.update(
            JobId(999),
            &JobUpdate {
                status: Some(JobStatus::Done),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(SpoolError::NotFound(JobId(999)))));
    }

    #[test]
    fn list_returns_newest_first_and_honours_limit() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let ids: Vec<JobId> = (0..5)
            .map(|i| store.insert(&text_payload(&format!("job {i}"))).expect("insert"))
            .collect();

        let listed = store.list(3).expect("list");
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, ids[4]);
        assert_eq!(listed[1].id, ids[3]);
        assert_eq!(listed[2].id, ids[2]);
    }

    #[test]
    fn pending_ids_filters_and_orders() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let queued = store.insert(&text_payload("queued")).expect("insert");
        let done = store.insert(&text_payload("done")).expect("insert");
        let errored = store.insert(&text_payload("errored")).expect("insert");
        let processing = store.insert(&text_payload("processing")).expect("insert");

        store
            .update(
                done,
                &JobUpdate {
                    status: Some(JobStatus::Done),
                    ..Default::default()
                },
            )
            .expect("update");
        store
            .update(
                errored,
                &JobUpdate {
                    status: Some(JobStatus::Error),
                    ..Default::default()
                },
            )
            .expect("update");
        store
            .update(
                processing,
                &JobUpdate {
                    status: Some(JobStatus::Processing),
                    ..Default::default()
                },
            )
            .expect("update");

        // queued and error rows only, in creation order.
        let pending = store.pending_ids().expect("pending");
        assert_eq!(pending, vec![queued, errored]);
    }

    #[test]
    fn pending_count_tracks_active_jobs() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        assert_eq!(store.pending_count().expect("count"), 0);

        let a = store.insert(&text_payload("a")).expect("insert");
        let b = store.insert(&text_payload("b")).expect("insert");
        assert_eq!(store.pending_count().expect("count"), 2);

        store
            .update(
                a,
                &JobUpdate {
                    status: Some(JobStatus::Processing),
                    ..Default::default()
                },
            )
            .expect("update");
        assert_eq!(store.pending_count().expect("count"), 2);

        store
            .update(
                b,
                &JobUpdate {
                    status: Some(JobStatus::Done),
                    ..Default::default()
                },
            )
            .expect("update");
        assert_eq!(store.pending_count().expect("count"), 1);
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobs.db");

        let id = {
            let store = JobStore::open(&path).expect("open");
            store.insert(&text_payload("persisted")).expect("insert")
        };

        let store = JobStore::open(&path).expect("reopen");
        let job = store.get(id).expect("get").expect("found");
        assert_eq!(job.payload, text_payload("persisted"));
        assert_eq!(job.status, JobStatus::Queued);
    }
}
