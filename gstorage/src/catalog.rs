use crate::batch::Batch;
use crate::errors::Result;
use crate::models::{FailedBatchRecord, RunLog, RunStats};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite metadata catalog: one row per run plus the full contents of
/// every permanently failed batch, kept for manual replay.
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path.as_ref())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS run_logs (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT,
                stats TEXT
            );
            CREATE TABLE IF NOT EXISTS failed_batches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL,
                batch_seq INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                reason TEXT NOT NULL,
                payload TEXT NOT NULL,
                failed_at INTEGER NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn create_run_log(&self, source: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let start_time = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO run_logs (source, start_time, status) VALUES (?1, ?2, 'RUNNING')",
            params![source, start_time],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finish_run_log(&self, run_id: i64, status: &str, stats: &RunStats) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let end_time = chrono::Utc::now().timestamp();
        conn.execute(
            "UPDATE run_logs SET status = ?1, stats = ?2, end_time = ?3 WHERE run_id = ?4",
            params![status, serde_json::to_string(stats)?, end_time, run_id],
        )?;
        Ok(())
    }

    pub fn latest_run_log(&self) -> Result<Option<RunLog>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, source, start_time, end_time, status, stats
             FROM run_logs ORDER BY run_id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            Ok(Some(RunLog {
                run_id: row.get(0)?,
                source: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                status: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                stats: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            }))
        } else {
            Ok(None)
        }
    }

    /// Records a permanently failed batch in full.
    pub fn record_failed_batch(&self, run_id: i64, batch: &Batch, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let failed_at = chrono::Utc::now().timestamp();
        let payload = serde_json::json!({
            "entities": batch.entities,
            "relationships": batch.relationships,
        });
        conn.execute(
            "INSERT INTO failed_batches
                (run_id, batch_seq, start_offset, end_offset, reason, payload, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                batch.seq as i64,
                batch.start_offset as i64,
                batch.end_offset as i64,
                reason,
                serde_json::to_string(&payload)?,
                failed_at
            ],
        )?;
        Ok(())
    }

    pub fn list_failed_batches(&self, run_id: i64) -> Result<Vec<FailedBatchRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, run_id, batch_seq, start_offset, end_offset, reason, payload, failed_at
             FROM failed_batches WHERE run_id = ?1 ORDER BY batch_seq",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(FailedBatchRecord {
                id: row.get(0)?,
                run_id: row.get(1)?,
                batch_seq: row.get::<_, i64>(2)? as u64,
                start_offset: row.get::<_, i64>(3)? as u64,
                end_offset: row.get::<_, i64>(4)? as u64,
                reason: row.get(5)?,
                payload: row.get(6)?,
                failed_at: row.get(7)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
