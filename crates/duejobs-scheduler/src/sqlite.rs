use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::{
    db::init_table,
    error::StoreError,
    store::JobStore,
    types::{ClaimOutcome, JobId, JobRecord, TableName},
};

const COLUMNS: &str = "job_id, due_at, type, args, run_at";

/// [`JobStore`] backed by a single SQLite connection.
///
/// Every statement runs under the connection mutex, which makes the
/// conditional `claim` update atomic with respect to concurrent sweeps in
/// this process. Values are always bound as parameters; only the validated
/// [`TableName`] is interpolated.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (or create) the database at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        info!(path = %path.display(), "job store opened");
        Ok(Self::new(conn))
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Create `table` if it does not exist yet.
    pub fn ensure_table(&self, table: &TableName) -> Result<(), StoreError> {
        let conn = self.lock()?;
        init_table(&conn, table)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run a record query, decoding row by row.
    ///
    /// Rows that cannot be decoded are logged and left out, so a single bad
    /// row never hides the rest of the table.
    fn query_records(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let mut stmt = conn.prepare_cached(sql)?;
        let mut records = Vec::new();
        for raw in stmt.query_map(params, read_row)? {
            match raw.map_err(row_error).and_then(into_record) {
                Ok(record) => records.push(record),
                Err(StoreError::Corrupt(reason)) => {
                    warn!("skipping unreadable job row: {reason}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

type RawRow = (i64, i64, String, String, Option<i64>);

/// Column type and conversion failures mean the row itself is bad.
fn row_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => StoreError::Corrupt(err.to_string()),
        other => StoreError::Database(other),
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?, // job_id
        row.get(1)?, // due_at
        row.get(2)?, // type
        row.get(3)?, // args
        row.get(4)?, // run_at
    ))
}

fn into_record((job_id, due_at, job_type, args, run_at): RawRow) -> Result<JobRecord, StoreError> {
    Ok(JobRecord {
        job_id: JobId(job_id),
        due_at: from_micros(due_at)?,
        job_type,
        args,
        run_at: run_at.map(from_micros).transpose()?,
    })
}

/// Epoch microseconds. Every `DateTime<Utc>` fits in an i64 and the columns
/// compare numerically.
fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(raw: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(raw)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {raw} out of range")))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(
        &self,
        table: &TableName,
        due_at: DateTime<Utc>,
        job_type: &str,
        encoded_args: &str,
    ) -> Result<JobId, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO \"{table}\" (due_at, type, args) VALUES (?1, ?2, ?3)"),
            rusqlite::params![to_micros(due_at), job_type, encoded_args],
        )?;
        // Read under the same lock, so this is our row.
        let id = JobId(conn.last_insert_rowid());
        debug!(%table, job_id = %id, job_type, "job row inserted");
        Ok(id)
    }

    async fn select_due(
        &self,
        table: &TableName,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM \"{table}\"
                 WHERE run_at IS NULL AND due_at < ?1
                 ORDER BY job_id"
            ),
            [to_micros(now)],
        )
    }

    async fn claim(
        &self,
        table: &TableName,
        job_id: JobId,
        run_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let conn = self.lock()?;
        let n = conn.execute(
            &format!("UPDATE \"{table}\" SET run_at = ?1 WHERE job_id = ?2 AND run_at IS NULL"),
            rusqlite::params![to_micros(run_at), job_id.0],
        )?;
        Ok(if n == 1 {
            ClaimOutcome::Claimed
        } else {
            ClaimOutcome::AlreadyClaimed
        })
    }

    async fn delete(&self, table: &TableName, job_id: JobId) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let n = conn.execute(
            &format!("DELETE FROM \"{table}\" WHERE job_id = ?1"),
            [job_id.0],
        )?;
        debug!(%table, %job_id, deleted = n, "job row delete");
        Ok(())
    }

    async fn select_active(&self, table: &TableName) -> Result<Vec<JobRecord>, StoreError> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            &format!("SELECT {COLUMNS} FROM \"{table}\" WHERE run_at IS NULL ORDER BY job_id"),
            [],
        )
    }

    async fn select_by_id(
        &self,
        table: &TableName,
        job_id: JobId,
    ) -> Result<Option<JobRecord>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM \"{table}\" WHERE job_id = ?1"),
                [job_id.0],
                read_row,
            )
            .optional()
            .map_err(row_error)?;
        raw.map(into_record).transpose()
    }
}
