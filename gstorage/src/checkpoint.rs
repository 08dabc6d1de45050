use crate::errors::{Result, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

/// Durable record of run progress. Absence of the file means "start from
/// offset 0".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// First source row not yet confirmed written.
    pub offset: u64,
    pub rows_processed: u64,
    pub rows_skipped: u64,
    pub chunks_skipped: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn at_start() -> Self {
        Self {
            offset: 0,
            rows_processed: 0,
            rows_skipped: 0,
            chunks_skipped: 0,
            batches_committed: 0,
            batches_failed: 0,
            saved_at: Utc::now(),
        }
    }
}

/// Persists checkpoints with a write-then-rename so a crash mid-write can
/// never corrupt the readable file.
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| StorageError::Checkpoint("checkpoint path has no parent".into()))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| StorageError::Checkpoint(e.to_string()))?;
        serde_json::to_writer_pretty(&mut tmp, checkpoint)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Checkpoint(e.to_string()))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Checkpoint>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Tracks confirmed batch row ranges and exposes the minimum confirmed
/// contiguous offset. Batches complete out of submission order, so "last
/// batch finished" is not a safe resume point; the frontier is.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    frontier: u64,
    pending: BTreeMap<u64, u64>,
}

impl OffsetTracker {
    pub fn new(frontier: u64) -> Self {
        Self {
            frontier,
            pending: BTreeMap::new(),
        }
    }

    /// Records `[start, end)` as confirmed, collapsing into the frontier
    /// when contiguous.
    pub fn confirm(&mut self, start: u64, end: u64) {
        if end <= start {
            return;
        }
        self.pending.insert(start, end);
        while let Some((&start, &end)) = self.pending.first_key_value() {
            if start > self.frontier {
                break;
            }
            self.pending.pop_first();
            if end > self.frontier {
                self.frontier = end;
            }
        }
    }

    /// First offset not yet confirmed contiguously from the start.
    pub fn frontier(&self) -> u64 {
        self.frontier
    }

    pub fn has_gaps(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_load_clear_round_trip() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("checkpoint.json"));

        assert!(manager.load().unwrap().is_none());

        let mut checkpoint = Checkpoint::at_start();
        checkpoint.offset = 5_000;
        checkpoint.rows_processed = 5_000;
        manager.save(&checkpoint).unwrap();

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.offset, 5_000);

        manager.clear().unwrap();
        assert!(manager.load().unwrap().is_none());
        // Clearing twice is fine.
        manager.clear().unwrap();
    }

    #[test]
    fn overwrite_keeps_latest() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("checkpoint.json"));

        let mut checkpoint = Checkpoint::at_start();
        manager.save(&checkpoint).unwrap();
        checkpoint.offset = 42;
        manager.save(&checkpoint).unwrap();

        assert_eq!(manager.load().unwrap().unwrap().offset, 42);
    }

    #[test]
    fn frontier_waits_for_contiguous_ranges() {
        let mut tracker = OffsetTracker::new(0);
        tracker.confirm(100, 200);
        assert_eq!(tracker.frontier(), 0);
        assert!(tracker.has_gaps());

        tracker.confirm(0, 100);
        assert_eq!(tracker.frontier(), 200);
        assert!(!tracker.has_gaps());
    }

    #[test]
    fn out_of_order_completions_collapse() {
        let mut tracker = OffsetTracker::new(0);
        tracker.confirm(200, 300);
        tracker.confirm(0, 100);
        assert_eq!(tracker.frontier(), 100);
        tracker.confirm(100, 200);
        assert_eq!(tracker.frontier(), 300);
    }

    #[test]
    fn resume_starts_from_loaded_frontier() {
        let mut tracker = OffsetTracker::new(5_000);
        tracker.confirm(5_000, 6_000);
        assert_eq!(tracker.frontier(), 6_000);
    }
}
