use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

/// On-disk layout for one load target. Everything lives under a single
/// base directory so a run can be moved or wiped as a unit.
#[derive(Deserialize, Debug, Clone)]
pub struct StoragePaths {
    pub checkpoint_path: PathBuf,
    pub catalog_path: PathBuf,
    pub graph_path: PathBuf,
}

impl StoragePaths {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            checkpoint_path: base_path.join("checkpoint.json"),
            catalog_path: base_path.join("catalog.sqlite"),
            graph_path: base_path.join("graph.sqlite"),
        }
    }
}

/// Tuning knobs consumed by the pipeline. How these values are loaded
/// (file, env, CLI) is the caller's concern.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoaderConfig {
    /// Rows pulled from the source per chunk.
    pub chunk_size: usize,
    /// Entity count per label bucket that freezes a batch.
    pub batch_size: usize,
    /// Confirmed rows between checkpoint saves.
    pub checkpoint_interval: u64,
    /// Commit worker count; also the store connection pool size.
    pub workers: usize,
    /// In-flight batches allowed before `submit` blocks.
    pub queue_depth: usize,
    /// Retries per batch on transient store errors.
    pub max_retries: u32,
    /// Base delay for exponential retry backoff, in milliseconds.
    pub retry_base_ms: u64,
    /// Permanently failed batches in a row before the run aborts.
    pub max_consecutive_failures: u32,
    /// Abort on the first permanently failed batch.
    pub fail_fast: bool,
    /// Remove the checkpoint file after a clean finish.
    pub clear_checkpoint_on_done: bool,
    /// Gap between episodes, in days, that produces a synthetic idle interval.
    pub idle_gap_days: i64,
    /// Emit a single idle interval for rows with no episodes at all.
    pub infer_initial: bool,
    /// Anchor date for inferred initial idle intervals.
    pub default_start: NaiveDate,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2_000,
            batch_size: 1_000,
            checkpoint_interval: 10_000,
            workers: default_workers(),
            queue_depth: 8,
            max_retries: 5,
            retry_base_ms: 200,
            max_consecutive_failures: 3,
            fail_fast: false,
            clear_checkpoint_on_done: false,
            idle_gap_days: 90,
            infer_initial: false,
            default_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
        }
    }
}

fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    (cores * 2).min(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_base() {
        let paths = StoragePaths::new("/tmp/load");
        assert!(paths.checkpoint_path.ends_with("checkpoint.json"));
        assert!(paths.catalog_path.ends_with("catalog.sqlite"));
        assert!(paths.graph_path.ends_with("graph.sqlite"));
    }

    #[test]
    fn config_deserializes_partial_overrides() {
        let config: LoaderConfig =
            serde_json::from_str(r#"{"batch_size": 50, "fail_fast": true}"#).unwrap();
        assert_eq!(config.batch_size, 50);
        assert!(config.fail_fast);
        assert_eq!(config.max_retries, LoaderConfig::default().max_retries);
    }
}
