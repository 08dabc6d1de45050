use crate::batch::BatchAccumulator;
use crate::catalog::Catalog;
use crate::checkpoint::{Checkpoint, CheckpointManager, OffsetTracker};
use crate::config::LoaderConfig;
use crate::coordinator::{BatchOutcome, ParallelCoordinator};
use crate::errors::{Result, StorageError};
use crate::loader::{BatchLoader, WriteResult};
use crate::models::{RunReport, RunStats};
use crate::source::{RecordSource, RecordTransformer, Transformed};
use crate::store::{ConnectionPool, GraphStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long a cancelled run waits for in-flight batches before exiting.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Pipeline lifecycle. `Failed` is only reached by fatal errors; skipped
/// records, corrupt chunks and isolated batch failures keep the run in
/// `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Running,
    Draining,
    Done,
    Failed,
}

/// Run-level cancellation signal. Setting it stops extraction; in-flight
/// batches are allowed to finish so no partial entity writes occur.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Orchestrates one load run: extract → transform → accumulate →
/// dispatch → checkpoint.
///
/// The ingestion path stays single-tasked (which is what lets the
/// accumulator's dedup index go unlocked); only the commit stage fans
/// out. Checkpoints advance along the minimum confirmed contiguous
/// offset, never "latest completion", so a crash at any point resumes
/// without losing or duplicating rows.
pub struct Pipeline {
    config: LoaderConfig,
    source: Box<dyn RecordSource>,
    transformer: Arc<dyn RecordTransformer>,
    store: Arc<dyn GraphStore>,
    checkpoints: CheckpointManager,
    catalog: Arc<Catalog>,
    state: RunState,
}

impl Pipeline {
    pub fn new(
        config: LoaderConfig,
        source: Box<dyn RecordSource>,
        transformer: Arc<dyn RecordTransformer>,
        store: Arc<dyn GraphStore>,
        checkpoints: CheckpointManager,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            config,
            source,
            transformer,
            store,
            checkpoints,
            catalog,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(&mut self, source_label: &str, cancel: CancelFlag) -> Result<RunReport> {
        let resume_from = self.checkpoints.load()?;
        let start = resume_from.clone().unwrap_or_else(Checkpoint::at_start);
        if resume_from.is_some() {
            log::info!(
                "resuming '{}' from checkpoint offset {}",
                source_label,
                start.offset
            );
        }

        let mut stats = RunStats::new();
        stats.rows_processed = start.rows_processed;
        stats.rows_skipped = start.rows_skipped;
        stats.batches_committed = start.batches_committed;
        stats.batches_failed = start.batches_failed;

        self.source.seek(start.offset)?;

        let pool = ConnectionPool::open(self.store.as_ref(), self.config.workers)
            .await
            .map_err(|e| StorageError::StoreUnreachable(e.to_string()))?;
        let loader = BatchLoader::new(
            self.config.max_retries,
            Duration::from_millis(self.config.retry_base_ms),
        );
        let mut coordinator = ParallelCoordinator::new(loader, pool, self.config.queue_depth);
        let mut accumulator = BatchAccumulator::new(self.config.batch_size, start.offset);
        let mut tracker = OffsetTracker::new(start.offset);

        let run_id = self.catalog.create_run_log(source_label)?;
        let mut progress = Progress {
            run_id,
            consecutive_failures: 0,
            last_saved_offset: start.offset,
            base_chunks_skipped: start.chunks_skipped,
            fatal: None,
        };

        self.state = RunState::Running;
        let mut next_offset = start.offset;

        while progress.fatal.is_none() && !cancel.is_cancelled() {
            let chunk = match self.source.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    progress.fatal = Some(StorageError::Source(e.to_string()));
                    break;
                }
            };
            next_offset = chunk.end_offset;

            for record in &chunk.records {
                match self.transformer.transform(record) {
                    Transformed::Set(set) => {
                        accumulator.add(set);
                        stats.rows_processed += 1;
                    }
                    Transformed::Skip(reason) => {
                        log::debug!("row {} skipped: {:?}", record.offset, reason);
                        stats.rows_skipped += 1;
                    }
                }
                if accumulator.is_batch_ready() {
                    coordinator.submit(accumulator.take_batch(record.offset + 1)).await;
                }
            }

            for outcome in coordinator.poll_completions() {
                self.apply_outcome(outcome, &mut stats, &mut tracker, &mut progress);
            }
            stats.chunks_skipped = progress.base_chunks_skipped + self.source.chunks_skipped();
            self.maybe_checkpoint(&stats, &tracker, &mut progress, false)?;
        }

        // DRAINING: flush the tail, wait out in-flight batches, then take
        // the final checkpoint. After a fatal error nothing new is
        // submitted; in-flight batches still finish to avoid partial
        // entity writes.
        self.state = RunState::Draining;
        if progress.fatal.is_none() {
            if !accumulator.is_empty() {
                coordinator.submit(accumulator.take_batch(next_offset)).await;
            } else if accumulator.pending_start() < next_offset {
                // Trailing rows produced nothing to write (all skipped);
                // they still count as handled for resume purposes.
                tracker.confirm(accumulator.pending_start(), next_offset);
            }
        }
        let outcomes = if cancel.is_cancelled() {
            // Bounded wait on cancellation; anything still in flight after
            // this stays unconfirmed and is retried on resume.
            let drained = tokio::time::timeout(DRAIN_TIMEOUT, coordinator.drain()).await;
            drained.unwrap_or_else(|_| {
                log::warn!(
                    "batches still in flight after {:?}; leaving them unconfirmed",
                    DRAIN_TIMEOUT
                );
                Vec::new()
            })
        } else {
            coordinator.drain().await
        };
        for outcome in outcomes {
            self.apply_outcome(outcome, &mut stats, &mut tracker, &mut progress);
        }
        stats.chunks_skipped = progress.base_chunks_skipped + self.source.chunks_skipped();
        stats.refs_deduped = accumulator.refs_deduped();
        self.maybe_checkpoint(&stats, &tracker, &mut progress, true)?;

        if let Some(fatal) = progress.fatal {
            self.state = RunState::Failed;
            self.catalog.finish_run_log(run_id, "FAILED", &stats)?;
            log::error!(
                "run failed at offset {}: {} ({} rows processed, {} skipped, {} batches failed)",
                tracker.frontier(),
                fatal,
                stats.rows_processed,
                stats.rows_skipped,
                stats.batches_failed
            );
            return Err(fatal);
        }

        let cancelled = cancel.is_cancelled();
        self.state = RunState::Done;
        let status = if cancelled { "CANCELLED" } else { "DONE" };
        self.catalog.finish_run_log(run_id, status, &stats)?;
        if !cancelled && self.config.clear_checkpoint_on_done {
            self.checkpoints.clear()?;
        }
        log::info!(
            "run {}: {} rows processed, {} skipped, {} chunks skipped, {} batches committed, {} failed, {:.0} rows/s",
            status.to_lowercase(),
            stats.rows_processed,
            stats.rows_skipped,
            stats.chunks_skipped,
            stats.batches_committed,
            stats.batches_failed,
            stats.rate()
        );

        Ok(RunReport {
            final_offset: tracker.frontier(),
            stats,
            cancelled,
        })
    }

    fn apply_outcome(
        &self,
        outcome: BatchOutcome,
        stats: &mut RunStats,
        tracker: &mut OffsetTracker,
        progress: &mut Progress,
    ) {
        match outcome.result {
            WriteResult::Committed {
                entities,
                relationships,
            } => {
                stats.batches_committed += 1;
                stats.entities_written += entities;
                stats.relationships_written += relationships;
                progress.consecutive_failures = 0;
                tracker.confirm(outcome.start_offset, outcome.end_offset);
            }
            WriteResult::Failed { reason, attempts } => {
                stats.batches_failed += 1;
                progress.consecutive_failures += 1;
                log::error!(
                    "batch {} failed permanently after {} attempt(s): {}",
                    outcome.batch_seq,
                    attempts,
                    reason
                );
                if let Some(batch) = &outcome.failed_batch {
                    if let Err(e) = self.catalog.record_failed_batch(progress.run_id, batch, &reason)
                    {
                        log::error!("could not record failed batch {}: {}", batch.seq, e);
                    }
                }

                let fatal = self.config.fail_fast
                    || progress.consecutive_failures >= self.config.max_consecutive_failures;
                if fatal {
                    if progress.fatal.is_none() {
                        progress.fatal = Some(StorageError::Fatal(format!(
                            "batch {} failed permanently: {}",
                            outcome.batch_seq, reason
                        )));
                    }
                    // Leave the range unconfirmed so a resume retries it.
                } else {
                    // Recorded for manual replay; the frontier moves on so
                    // one poisoned batch cannot stall resume forever.
                    tracker.confirm(outcome.start_offset, outcome.end_offset);
                }
            }
        }
    }

    fn maybe_checkpoint(
        &self,
        stats: &RunStats,
        tracker: &OffsetTracker,
        progress: &mut Progress,
        force: bool,
    ) -> Result<()> {
        let frontier = tracker.frontier();
        if !force && frontier - progress.last_saved_offset < self.config.checkpoint_interval {
            return Ok(());
        }
        if !force && frontier == progress.last_saved_offset {
            return Ok(());
        }
        let checkpoint = Checkpoint {
            offset: frontier,
            rows_processed: stats.rows_processed,
            rows_skipped: stats.rows_skipped,
            chunks_skipped: stats.chunks_skipped,
            batches_committed: stats.batches_committed,
            batches_failed: stats.batches_failed,
            saved_at: chrono::Utc::now(),
        };
        self.checkpoints.save(&checkpoint)?;
        progress.last_saved_offset = frontier;
        log::info!(
            "checkpoint at offset {} ({} rows, {:.0} rows/s)",
            frontier,
            stats.rows_processed,
            stats.rate()
        );
        Ok(())
    }
}

struct Progress {
    run_id: i64,
    consecutive_failures: u32,
    last_saved_offset: u64,
    base_chunks_skipped: u64,
    fatal: Option<StorageError>,
}
