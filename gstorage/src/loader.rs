use crate::batch::Batch;
use crate::store::GraphConnection;
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of writing one batch. Failures carry the reason instead of
/// unwinding, so the coordinator can isolate them per batch.
#[derive(Debug, Clone)]
pub enum WriteResult {
    Committed { entities: u64, relationships: u64 },
    Failed { reason: String, attempts: u32 },
}

impl WriteResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteResult::Committed { .. })
    }
}

/// Writes batches to a store connection with retry-on-transient semantics.
///
/// Entity label groups go first, then relationships grouped by type,
/// because relationships may reference entities from the same batch. A
/// transient store error retries the whole batch with exponential backoff;
/// upsert semantics make the replay harmless.
pub struct BatchLoader {
    max_retries: u32,
    retry_base: Duration,
}

impl BatchLoader {
    pub fn new(max_retries: u32, retry_base: Duration) -> Self {
        Self {
            max_retries,
            retry_base,
        }
    }

    pub async fn write(&self, batch: &Batch, conn: &mut dyn GraphConnection) -> WriteResult {
        let mut attempt = 0u32;
        loop {
            match self.write_once(batch, conn).await {
                Ok((entities, relationships)) => {
                    return WriteResult::Committed {
                        entities,
                        relationships,
                    }
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.retry_base * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    log::warn!(
                        "batch {} transient store error (attempt {}/{}), retrying in {:?}: {}",
                        batch.seq,
                        attempt,
                        self.max_retries,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return WriteResult::Failed {
                        reason: e.to_string(),
                        attempts: attempt + 1,
                    }
                }
            }
        }
    }

    async fn write_once(
        &self,
        batch: &Batch,
        conn: &mut dyn GraphConnection,
    ) -> crate::store::StoreResult<(u64, u64)> {
        let mut entities = 0;
        for (label, nodes) in &batch.entities {
            entities += conn.upsert_nodes(label, nodes).await?;
        }

        let mut by_type: BTreeMap<&str, Vec<_>> = BTreeMap::new();
        for rel in &batch.relationships {
            by_type
                .entry(rel.rel_type.as_str())
                .or_default()
                .push(rel.clone());
        }
        let mut relationships = 0;
        for (rel_type, rels) in by_type {
            relationships += conn.upsert_relationships(rel_type, &rels).await?;
        }
        Ok((entities, relationships))
    }
}
