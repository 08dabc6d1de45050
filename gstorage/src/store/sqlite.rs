use crate::entity::{Entity, EntityRef, Relationship};
use crate::store::{GraphConnection, GraphStore, StoreError, StoreResult};
use crate::utils::id::{stable_edge_id, stable_node_id};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use uuid::Uuid;

/// Durable graph backend on a single SQLite file. Node identity is the
/// UUIDv5 of `(label, natural key)`, so upserts from any run or retry land
/// on the same row. Property bags are JSON; merges go through
/// `json_patch`, which gives last-write-wins per property.
pub struct SqliteGraphStore {
    path: PathBuf,
}

impl SqliteGraphStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates tables and indexes. Call once before pooling connections.
    pub fn initialize_schema(&self) -> crate::errors::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                natural_key TEXT NOT NULL,
                props TEXT NOT NULL DEFAULT '{}'
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_label_key
                ON nodes(label, natural_key);
            CREATE TABLE IF NOT EXISTS rels (
                id TEXT PRIMARY KEY,
                rel_type TEXT NOT NULL,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                props TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_rels_from ON rels(from_id);
            CREATE INDEX IF NOT EXISTS idx_rels_to ON rels(to_id);
            COMMIT;",
        )?;
        Ok(())
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn connect(&self) -> StoreResult<Box<dyn GraphConnection>> {
        let conn = Connection::open(&self.path)
            .map_err(|e| StoreError::Permanent(format!("open {}: {}", self.path.display(), e)))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(classify)?;
        conn.pragma_update(None, "busy_timeout", 5_000)
            .map_err(classify)?;
        Ok(Box::new(SqliteConnection { conn }))
    }
}

struct SqliteConnection {
    conn: Connection,
}

fn classify(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) => match err.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                StoreError::Transient(e.to_string())
            }
            _ => StoreError::Permanent(e.to_string()),
        },
        _ => StoreError::Permanent(e.to_string()),
    }
}

fn props_json(props: &crate::entity::PropMap) -> StoreResult<String> {
    serde_json::to_string(props).map_err(|e| StoreError::Permanent(e.to_string()))
}

fn node_id(entity_ref: &EntityRef) -> Uuid {
    stable_node_id(&entity_ref.label, &entity_ref.key)
}

#[async_trait]
impl GraphConnection for SqliteConnection {
    async fn upsert_nodes(&mut self, label: &str, nodes: &[Entity]) -> StoreResult<u64> {
        let tx = self.conn.transaction().map_err(classify)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO nodes (id, label, natural_key, props)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        props = json_patch(nodes.props, excluded.props)",
                )
                .map_err(classify)?;
            for node in nodes {
                let id = stable_node_id(label, &node.key).to_string();
                stmt.execute(params![id, label, node.key, props_json(&node.props)?])
                    .map_err(classify)?;
            }
        }
        tx.commit().map_err(classify)?;
        Ok(nodes.len() as u64)
    }

    async fn upsert_relationships(
        &mut self,
        rel_type: &str,
        rels: &[Relationship],
    ) -> StoreResult<u64> {
        let tx = self.conn.transaction().map_err(classify)?;
        {
            // A relationship may land before the batch that owns one of its
            // endpoint entities; a key-only stub keeps the edge valid and is
            // merged over when the entity row arrives.
            let mut stub = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO nodes (id, label, natural_key, props)
                     VALUES (?1, ?2, ?3, '{}')",
                )
                .map_err(classify)?;
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO rels (id, rel_type, from_id, to_id, props)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        props = json_patch(rels.props, excluded.props)",
                )
                .map_err(classify)?;
            for rel in rels {
                let from_id = node_id(&rel.from);
                let to_id = node_id(&rel.to);
                stub.execute(params![from_id.to_string(), rel.from.label, rel.from.key])
                    .map_err(classify)?;
                stub.execute(params![to_id.to_string(), rel.to.label, rel.to.key])
                    .map_err(classify)?;

                let id = stable_edge_id(rel_type, &from_id, &to_id).to_string();
                stmt.execute(params![
                    id,
                    rel_type,
                    from_id.to_string(),
                    to_id.to_string(),
                    props_json(&rel.props)?
                ])
                .map_err(classify)?;
            }
        }
        tx.commit().map_err(classify)?;
        Ok(rels.len() as u64)
    }
}
