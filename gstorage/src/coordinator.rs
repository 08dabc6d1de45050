use crate::batch::Batch;
use crate::loader::{BatchLoader, WriteResult};
use crate::store::ConnectionPool;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// Completion report for one dispatched batch. The payload is retained
/// only on failure, so the pipeline can record it for manual replay.
#[derive(Debug)]
pub struct BatchOutcome {
    pub batch_seq: u64,
    pub start_offset: u64,
    pub end_offset: u64,
    pub result: WriteResult,
    pub failed_batch: Option<Batch>,
}

/// Dispatches frozen batches to a bounded set of commit workers.
///
/// `submit` blocks once `queue_depth` batches are in flight, so a slow
/// store applies backpressure to the ingestion task instead of growing an
/// unbounded queue. Completions arrive out of submission order; the
/// pipeline's offset tracker is what restores a safe resume point.
pub struct ParallelCoordinator {
    loader: Arc<BatchLoader>,
    pool: ConnectionPool,
    inflight_slots: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<BatchOutcome>,
    rx: mpsc::UnboundedReceiver<BatchOutcome>,
    in_flight: usize,
}

impl ParallelCoordinator {
    pub fn new(loader: BatchLoader, pool: ConnectionPool, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            loader: Arc::new(loader),
            pool,
            inflight_slots: Arc::new(Semaphore::new(queue_depth.max(1))),
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Hands a batch to a worker. Awaits a free in-flight slot first.
    pub async fn submit(&mut self, batch: Batch) {
        let permit = self
            .inflight_slots
            .clone()
            .acquire_owned()
            .await
            .expect("coordinator semaphore closed");
        let mut pooled = self.pool.checkout().await;
        log::debug!(
            "dispatching batch {} ({} entities, {} relationships, rows {}..{})",
            batch.seq,
            batch.entity_count(),
            batch.relationship_count(),
            batch.start_offset,
            batch.end_offset
        );

        let loader = Arc::clone(&self.loader);
        let pool = self.pool.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = loader.write(&batch, pooled.connection()).await;
            pool.give_back(pooled).await;

            let failed_batch = (!result.is_committed()).then(|| batch.clone());
            let outcome = BatchOutcome {
                batch_seq: batch.seq,
                start_offset: batch.start_offset,
                end_offset: batch.end_offset,
                result,
                failed_batch,
            };
            // The receiver only goes away when the pipeline is dropped.
            let _ = tx.send(outcome);
            drop(permit);
        });
        self.in_flight += 1;
    }

    /// Collects any completions without blocking.
    pub fn poll_completions(&mut self) -> Vec<BatchOutcome> {
        let mut done = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            self.in_flight -= 1;
            done.push(outcome);
        }
        done
    }

    /// Waits for every in-flight batch to complete or fail.
    pub async fn drain(&mut self) -> Vec<BatchOutcome> {
        let mut done = Vec::new();
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(outcome) => {
                    self.in_flight -= 1;
                    done.push(outcome);
                }
                None => break,
            }
        }
        done
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
