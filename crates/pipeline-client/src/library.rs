//! Staged composite and pipeline libraries
//!
//! A change to a persisted definition is first recorded as a
//! [`PendingChange`], then sent to the remote service. Only when the
//! service confirms is the change committed into the graph store; a failed
//! call discards the staged change and leaves the store as it was.
//!
//! No store lock is held across a remote call.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use pipeline_engine::{
    Composite, CompositeDraft, CompositeId, CompositeMetadata, CompositePatch, InterfaceSelection,
    NodeId, PipelineDefinition, PipelineMetadata, SharedGraphStore,
};

use crate::error::{ClientError, PersistenceError, Result};
use crate::persistence::{CompositeService, PipelineService};

/// A composite change awaiting remote confirmation
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    Create(Composite),
    Update(CompositePatch),
    Delete,
}

/// Composite definitions backed by a remote service
pub struct CompositeLibrary {
    service: Arc<dyn CompositeService>,
    store: SharedGraphStore,
    pending: Mutex<BTreeMap<CompositeId, PendingChange>>,
}

impl CompositeLibrary {
    pub fn new(service: Arc<dyn CompositeService>, store: SharedGraphStore) -> Self {
        Self {
            service,
            store,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Changes sent but not yet confirmed
    pub fn pending(&self) -> Vec<(CompositeId, PendingChange)> {
        self.pending
            .lock()
            .iter()
            .map(|(id, change)| (id.clone(), change.clone()))
            .collect()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    fn stage(&self, id: &str, change: PendingChange) {
        self.pending.lock().insert(id.to_string(), change);
    }

    fn unstage(&self, id: &str) {
        self.pending.lock().remove(id);
    }

    /// Persist a new composite and register it in the store
    ///
    /// Returns the id the service stored it under.
    pub async fn create(&self, mut composite: Composite) -> std::result::Result<CompositeId, PersistenceError> {
        let errors = pipeline_engine::validate_composite(&composite);
        if !errors.is_empty() {
            return Err(PersistenceError::Invalid(errors));
        }

        let staged_id = composite.id.clone();
        self.stage(&staged_id, PendingChange::Create(composite.clone()));
        let result = self.service.create(&composite).await;
        self.unstage(&staged_id);

        let id = result?;
        composite.id = id.clone();
        self.commit(composite)?;
        log::info!("Created composite '{}'", id);
        Ok(id)
    }

    /// Extract a composite from the current graph and persist it
    pub async fn create_from_selection(
        &self,
        selected: &[NodeId],
        draft: &CompositeDraft,
        interface: &InterfaceSelection,
    ) -> Result<CompositeId> {
        // Extraction is pure; the read lock is released before the remote call
        let extraction = {
            let store = self.store.read();
            store.extract(selected, draft, interface)
        };
        let extraction = extraction.map_err(pipeline_engine::PipelineError::from)?;
        Ok(self.create(extraction.composite).await?)
    }

    /// Fetch one composite and register it in the store
    pub async fn fetch(&self, id: &str) -> std::result::Result<Composite, PersistenceError> {
        let composite = self.service.get(id).await?;
        self.commit(composite.clone())?;
        Ok(composite)
    }

    pub async fn list(&self, category: Option<&str>) -> std::result::Result<Vec<CompositeMetadata>, PersistenceError> {
        self.service.list(category).await
    }

    /// Apply a patch remotely, then replace the local definition
    pub async fn update(&self, id: &str, patch: CompositePatch) -> std::result::Result<Composite, PersistenceError> {
        let errors = pipeline_engine::validate_patch(&patch);
        if !errors.is_empty() {
            return Err(PersistenceError::Invalid(errors));
        }

        self.stage(id, PendingChange::Update(patch.clone()));
        let result = self.service.update(id, &patch).await;
        self.unstage(id);

        let updated = result?;
        self.commit(updated.clone())?;
        log::info!("Updated composite '{}' to version {}", id, updated.version);
        Ok(updated)
    }

    /// Delete remotely, then drop the local definition
    pub async fn delete(&self, id: &str) -> std::result::Result<(), PersistenceError> {
        self.stage(id, PendingChange::Delete);
        let result = self.service.delete(id).await;
        self.unstage(id);

        result?;
        self.store.write().remove_composite(id);
        log::info!("Deleted composite '{}'", id);
        Ok(())
    }

    fn commit(&self, composite: Composite) -> std::result::Result<(), PersistenceError> {
        self.store
            .write()
            .register_composite(composite)
            .map_err(PersistenceError::Invalid)
    }
}

/// Pipeline definitions backed by a remote service
pub struct PipelineLibrary {
    service: Arc<dyn PipelineService>,
    store: SharedGraphStore,
    /// Id of the definition currently loaded in the store
    current: Mutex<Option<String>>,
}

impl PipelineLibrary {
    pub fn new(service: Arc<dyn PipelineService>, store: SharedGraphStore) -> Self {
        Self {
            service,
            store,
            current: Mutex::new(None),
        }
    }

    pub fn current_id(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// Save the store's graph; reuses the current id when one is loaded
    pub async fn save(&self, name: &str, description: &str) -> std::result::Result<String, PersistenceError> {
        let mut definition = self.store.read().to_definition(name, description);
        definition.id = self.current_id();

        let id = self.service.save(&definition).await?;
        *self.current.lock() = Some(id.clone());
        log::info!("Saved pipeline '{}' as {}", name, id);
        Ok(id)
    }

    /// Fetch a definition and replace the store's graph with it
    pub async fn load(&self, id: &str) -> Result<PipelineDefinition> {
        let definition = self.service.get(id).await?;
        self.store
            .write()
            .load_definition(definition.clone())
            .map_err(ClientError::Pipeline)?;
        *self.current.lock() = Some(id.to_string());
        log::info!("Loaded pipeline '{}' ({} nodes)", id, definition.nodes.len());
        Ok(definition)
    }

    pub async fn list(&self) -> std::result::Result<Vec<PipelineMetadata>, PersistenceError> {
        self.service.list().await
    }

    pub async fn delete(&self, id: &str) -> std::result::Result<(), PersistenceError> {
        self.service.delete(id).await?;
        let mut current = self.current.lock();
        if current.as_deref() == Some(id) {
            *current = None;
        }
        Ok(())
    }
}
