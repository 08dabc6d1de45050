use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters the pipeline maintains and reports. Always surfaced at the end
/// of a run, even a partially failed one, so data-quality problems are
/// visible without aborting a migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub rows_processed: u64,
    pub rows_skipped: u64,
    pub chunks_skipped: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub entities_written: u64,
    pub relationships_written: u64,
    pub refs_deduped: u64,
    pub started_at: DateTime<Utc>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            rows_processed: 0,
            rows_skipped: 0,
            chunks_skipped: 0,
            batches_committed: 0,
            batches_failed: 0,
            entities_written: 0,
            relationships_written: 0,
            refs_deduped: 0,
            started_at: Utc::now(),
        }
    }

    /// Rows per second since the run started.
    pub fn rate(&self) -> f64 {
        let elapsed = (Utc::now() - self.started_at).num_milliseconds().max(1) as f64 / 1_000.0;
        self.rows_processed as f64 / elapsed
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished `Pipeline::run` hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stats: RunStats,
    /// Confirmed contiguous offset at exit; the resume point.
    pub final_offset: u64,
    pub cancelled: bool,
}

/// A permanently failed batch as recorded in the catalog for manual replay.
#[derive(Debug)]
pub struct FailedBatchRecord {
    pub id: i64,
    pub run_id: i64,
    pub batch_seq: u64,
    pub start_offset: u64,
    pub end_offset: u64,
    pub reason: String,
    /// Full batch contents as JSON.
    pub payload: String,
    pub failed_at: i64,
}

/// One row of the catalog's run log.
#[derive(Debug)]
pub struct RunLog {
    pub run_id: i64,
    pub source: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: String,
    pub stats: String,
}
