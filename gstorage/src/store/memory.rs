use crate::entity::{Entity, PropMap, Relationship};
use crate::store::{GraphConnection, GraphStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MemoryState {
    nodes: HashMap<(String, String), PropMap>,
    rels: HashMap<(String, String, String), PropMap>,
    faults: VecDeque<StoreError>,
    writes: u64,
}

/// HashMap-backed store for tests and dry runs. Scripted faults let tests
/// exercise the retry and failure-isolation paths: each queued error is
/// consumed by exactly one upsert call, in order.
#[derive(Clone, Default)]
pub struct MemoryGraphStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error for an upcoming upsert call.
    pub fn inject_fault(&self, error: StoreError) {
        self.state.lock().unwrap().faults.push_back(error);
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }

    pub fn node_count_for_label(&self, label: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .nodes
            .keys()
            .filter(|(l, _)| l == label)
            .count()
    }

    pub fn rel_count(&self) -> usize {
        self.state.lock().unwrap().rels.len()
    }

    pub fn nodes_for_label(&self, label: &str) -> Vec<(String, PropMap)> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .iter()
            .filter(|((l, _), _)| l == label)
            .map(|((_, key), props)| (key.clone(), props.clone()))
            .collect()
    }

    pub fn node_props(&self, label: &str, key: &str) -> Option<PropMap> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .get(&(label.to_string(), key.to_string()))
            .cloned()
    }

    /// Total upsert calls that reached the store, including failed ones.
    pub fn write_calls(&self) -> u64 {
        self.state.lock().unwrap().writes
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn connect(&self) -> StoreResult<Box<dyn GraphConnection>> {
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnection {
    fn take_fault(state: &mut MemoryState) -> Option<StoreError> {
        state.faults.pop_front()
    }
}

#[async_trait]
impl GraphConnection for MemoryConnection {
    async fn upsert_nodes(&mut self, label: &str, nodes: &[Entity]) -> StoreResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if let Some(fault) = Self::take_fault(&mut state) {
            return Err(fault);
        }
        for node in nodes {
            let slot = state
                .nodes
                .entry((label.to_string(), node.key.clone()))
                .or_default();
            for (name, value) in &node.props {
                slot.insert(name.clone(), value.clone());
            }
        }
        Ok(nodes.len() as u64)
    }

    async fn upsert_relationships(
        &mut self,
        rel_type: &str,
        rels: &[Relationship],
    ) -> StoreResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if let Some(fault) = Self::take_fault(&mut state) {
            return Err(fault);
        }
        for rel in rels {
            let from = format!("{}|{}", rel.from.label, rel.from.key);
            let to = format!("{}|{}", rel.to.label, rel.to.key);
            let slot = state
                .rels
                .entry((rel_type.to_string(), from, to))
                .or_default();
            for (name, value) in &rel.props {
                slot.insert(name.clone(), value.clone());
            }
        }
        Ok(rels.len() as u64)
    }
}
