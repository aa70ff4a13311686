use rusqlite::Connection;

use crate::{error::StoreError, types::TableName};

/// Create the jobs table `table` in `conn` (idempotent).
///
/// Also creates an index on `(run_at, due_at)` so the due-job query stays
/// cheap once the table holds thousands of claimed rows.
pub fn init_table(conn: &Connection, table: &TableName) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS \"{table}\" (
            job_id  INTEGER PRIMARY KEY AUTOINCREMENT,
            due_at  INTEGER NOT NULL,   -- unix epoch, microseconds
            type    TEXT    NOT NULL,
            args    TEXT    NOT NULL,   -- JSON array
            run_at  INTEGER             -- NULL until claimed
        );

        -- Due-job polling: WHERE run_at IS NULL AND due_at < ?
        CREATE INDEX IF NOT EXISTS \"idx_{table}_pending\" ON \"{table}\" (run_at, due_at);
        "
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let table = TableName::parse("jobs").unwrap();
        init_table(&conn, &table).unwrap();
        init_table(&conn, &table).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'jobs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
