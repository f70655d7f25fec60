//! Service container for dependency injection
//!
//! Wires the store, the orphan holder and the engine from settings.

use std::sync::Arc;

use tracing::debug;

use crate::application::{OrphanedItems, TreeEngine};
use crate::config::Settings;
use crate::domain::{EntityKind, HierarchySchema};
use crate::infrastructure::fixture::Dataset;
use crate::infrastructure::memory::MemoryStore;
use crate::infrastructure::InfraResult;

/// Container holding the settings and the shared store.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Store handle; engines get clones sharing the same state
    pub store: MemoryStore,
}

impl ServiceContainer {
    /// Create a container backed by the configured dataset, empty without one.
    ///
    /// Hierarchies showing parts need one component per project.
    pub fn new(settings: Settings) -> InfraResult<Self> {
        let dataset = match &settings.data_file {
            Some(path) => Dataset::load(path)?,
            None => {
                debug!("no data file configured, starting empty");
                Dataset::default()
            }
        };
        if HierarchySchema::resolve(settings.hierarchy).contains(EntityKind::Part) {
            dataset.validate_parts()?;
        }
        Ok(Self::with_store(settings, MemoryStore::from(dataset)))
    }

    /// Create a service container with a custom store (for testing).
    pub fn with_store(settings: Settings, store: MemoryStore) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
        }
    }

    /// Fresh engine with the configured hierarchy and an empty tree.
    pub fn engine(&self) -> InfraResult<TreeEngine> {
        let engine = TreeEngine::new(self.settings.hierarchy, Box::new(self.store.clone()));
        if !self.settings.show_orphans {
            return Ok(engine);
        }
        let mut store = self.store.clone();
        let orphans = OrphanedItems::load(&mut store, engine.schema())?;
        debug!("engine: {} orphans", orphans.len());
        Ok(engine.with_orphans(Box::new(orphans)))
    }
}
