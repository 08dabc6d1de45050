pub mod batch;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod errors;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod utils;

use crate::catalog::Catalog;
use crate::checkpoint::CheckpointManager;
use crate::config::{LoaderConfig, StoragePaths};
use crate::errors::Result;
use crate::pipeline::Pipeline;
use crate::source::{RecordSource, RecordTransformer};
use crate::store::sqlite::SqliteGraphStore;
use crate::store::GraphStore;
use std::sync::Arc;

/// The main entry point for the `gstorage` library.
///
/// `GStorage` bundles the storage-side components of a load target: the
/// graph store backend, the SQLite run catalog, and the checkpoint file,
/// all rooted under one base directory. Feed it a record source and a
/// transformer to get a runnable [`Pipeline`].
///
/// # Example
///
/// ```rust,no_run
/// use gstorage::{config::StoragePaths, GStorage};
///
/// let paths = StoragePaths::new("/var/lib/gmigrate/talent");
/// let storage = GStorage::open_sqlite(paths).unwrap();
/// ```
pub struct GStorage {
    pub paths: StoragePaths,
    pub catalog: Arc<Catalog>,
    pub store: Arc<dyn GraphStore>,
}

impl GStorage {
    /// Opens a target backed by the SQLite graph store, creating catalog
    /// and graph schemas as needed.
    pub fn open_sqlite(paths: StoragePaths) -> Result<Self> {
        let store = SqliteGraphStore::new(&paths.graph_path);
        store.initialize_schema()?;
        Self::open_with_store(paths, Arc::new(store))
    }

    /// Opens a target over any store backend (tests and dry runs use the
    /// in-memory one).
    pub fn open_with_store(paths: StoragePaths, store: Arc<dyn GraphStore>) -> Result<Self> {
        let catalog = Arc::new(Catalog::new(&paths.catalog_path)?);
        catalog.initialize_schema()?;
        Ok(Self {
            paths,
            catalog,
            store,
        })
    }

    pub fn checkpoint_manager(&self) -> CheckpointManager {
        CheckpointManager::new(&self.paths.checkpoint_path)
    }

    /// Assembles a pipeline over this target.
    pub fn pipeline(
        &self,
        config: LoaderConfig,
        source: Box<dyn RecordSource>,
        transformer: Arc<dyn RecordTransformer>,
    ) -> Pipeline {
        Pipeline::new(
            config,
            source,
            transformer,
            Arc::clone(&self.store),
            self.checkpoint_manager(),
            Arc::clone(&self.catalog),
        )
    }
}
