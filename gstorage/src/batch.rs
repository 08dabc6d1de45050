use crate::entity::{Entity, EntitySet, Relationship};
use std::collections::{BTreeMap, HashSet};

/// A frozen group of entities and relationships covering one contiguous
/// span of source rows. Created by the accumulator, handed to a commit
/// worker, discarded after the write is confirmed.
#[derive(Debug, Clone)]
pub struct Batch {
    pub seq: u64,
    /// Entities partitioned by label, in label order.
    pub entities: BTreeMap<String, Vec<Entity>>,
    pub relationships: Vec<Relationship>,
    /// Source rows `[start_offset, end_offset)` this batch accounts for.
    pub start_offset: u64,
    pub end_offset: u64,
}

impl Batch {
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }
}

/// Accumulates transformed rows into label buckets and deduplicates shared
/// reference entities across the whole run.
///
/// Single-writer: only the pipeline's ingestion task calls into this, so
/// the dedup index needs no locking. The index is never reset mid-run;
/// that is what guarantees each shared natural key is emitted in at most
/// one batch.
pub struct BatchAccumulator {
    batch_size: usize,
    dedup: HashSet<(String, String)>,
    buckets: BTreeMap<String, Vec<Entity>>,
    relationships: Vec<Relationship>,
    next_seq: u64,
    start_offset: u64,
    refs_deduped: u64,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize, start_offset: u64) -> Self {
        Self {
            batch_size,
            dedup: HashSet::new(),
            buckets: BTreeMap::new(),
            relationships: Vec::new(),
            next_seq: 0,
            start_offset,
            refs_deduped: 0,
        }
    }

    /// Folds one transformed row in. Reference entities already seen this
    /// run are dropped silently; primaries and relationships always land.
    pub fn add(&mut self, set: EntitySet) {
        if let Some(primary) = set.primary {
            self.push_entity(primary);
        }
        for reference in set.references {
            let key = (reference.label.clone(), reference.key.clone());
            if self.dedup.insert(key) {
                self.push_entity(reference);
            } else {
                self.refs_deduped += 1;
            }
        }
        self.relationships.extend(set.relationships);
    }

    fn push_entity(&mut self, entity: Entity) {
        self.buckets
            .entry(entity.label.clone())
            .or_default()
            .push(entity);
    }

    /// True once any label bucket reaches the configured threshold.
    pub fn is_batch_ready(&self) -> bool {
        self.buckets.values().any(|b| b.len() >= self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty() && self.relationships.is_empty()
    }

    /// Freezes the current accumulation into a batch covering rows up to
    /// `end_offset`. Buckets reset; the dedup index does not.
    pub fn take_batch(&mut self, end_offset: u64) -> Batch {
        let batch = Batch {
            seq: self.next_seq,
            entities: std::mem::take(&mut self.buckets),
            relationships: std::mem::take(&mut self.relationships),
            start_offset: self.start_offset,
            end_offset,
        };
        self.next_seq += 1;
        self.start_offset = end_offset;
        batch
    }

    /// Start of the row span the next frozen batch will cover.
    pub fn pending_start(&self) -> u64 {
        self.start_offset
    }

    pub fn refs_deduped(&self) -> u64 {
        self.refs_deduped
    }
}
