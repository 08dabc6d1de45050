pub mod memory;
pub mod sqlite;

use crate::entity::{Entity, Relationship};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};

/// Store-side failures, split by whether a retry can help. The loader
/// retries `Transient` with backoff; `Permanent` fails the batch at once.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("permanent store error: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One checked-out store connection. Never shared by two workers at once;
/// the pool hands it out for the duration of one batch write.
#[async_trait]
pub trait GraphConnection: Send {
    /// Upserts one label group: create-if-absent by natural key, else
    /// merge the supplied properties (last write wins per property).
    /// Returns the row count written.
    async fn upsert_nodes(&mut self, label: &str, nodes: &[Entity]) -> StoreResult<u64>;

    /// Upserts one relationship type group, idempotent by endpoint keys.
    async fn upsert_relationships(
        &mut self,
        rel_type: &str,
        rels: &[Relationship],
    ) -> StoreResult<u64>;
}

/// Factory for connections; the only thing the loader knows about the
/// store besides the upsert contract.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn connect(&self) -> StoreResult<Box<dyn GraphConnection>>;
}

/// Fixed-size pool of store connections. `checkout` waits for a free slot;
/// every connection is returned with `give_back` after the batch write.
pub struct ConnectionPool {
    slots: Arc<Semaphore>,
    idle: Arc<Mutex<VecDeque<Box<dyn GraphConnection>>>>,
}

impl ConnectionPool {
    pub async fn open(store: &dyn GraphStore, size: usize) -> StoreResult<Self> {
        let mut idle = VecDeque::with_capacity(size);
        for _ in 0..size {
            idle.push_back(store.connect().await?);
        }
        Ok(Self {
            slots: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(idle)),
        })
    }

    pub async fn checkout(&self) -> PooledConnection {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .expect("connection pool semaphore closed");
        let conn = self
            .idle
            .lock()
            .await
            .pop_front()
            .expect("pool slot acquired but no idle connection");
        PooledConnection {
            conn,
            _permit: permit,
        }
    }

    pub async fn give_back(&self, pooled: PooledConnection) {
        self.idle.lock().await.push_back(pooled.conn);
        // Dropping the permit frees the slot.
    }
}

impl Clone for ConnectionPool {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            idle: Arc::clone(&self.idle),
        }
    }
}

pub struct PooledConnection {
    conn: Box<dyn GraphConnection>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn connection(&mut self) -> &mut dyn GraphConnection {
        self.conn.as_mut()
    }
}
