//! Remote persistence for composites and pipeline definitions
//!
//! The services are opaque to the rest of the client: the library layer
//! only relies on the request/response shapes of these two traits.

mod file;
mod http;

pub use file::FilePersistence;
pub use http::HttpPersistence;

use async_trait::async_trait;
use pipeline_engine::{
    Composite, CompositeId, CompositeMetadata, CompositePatch, PipelineDefinition,
    PipelineMetadata,
};

use crate::error::PersistenceError;

/// Composite definition storage
#[async_trait]
pub trait CompositeService: Send + Sync {
    /// Store a new composite; returns the id it is stored under
    async fn create(&self, composite: &Composite) -> Result<CompositeId, PersistenceError>;

    async fn get(&self, id: &str) -> Result<Composite, PersistenceError>;

    /// List composites, optionally restricted to one category
    async fn list(&self, category: Option<&str>) -> Result<Vec<CompositeMetadata>, PersistenceError>;

    /// Apply a partial update; returns the updated definition
    async fn update(&self, id: &str, patch: &CompositePatch) -> Result<Composite, PersistenceError>;

    async fn delete(&self, id: &str) -> Result<(), PersistenceError>;
}

/// Pipeline definition storage
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Save a definition; a definition without an id is stored as new
    async fn save(&self, definition: &PipelineDefinition) -> Result<String, PersistenceError>;

    async fn list(&self) -> Result<Vec<PipelineMetadata>, PersistenceError>;

    async fn get(&self, id: &str) -> Result<PipelineDefinition, PersistenceError>;

    async fn delete(&self, id: &str) -> Result<(), PersistenceError>;
}

/// Reject ids that cannot be used as a single path segment
pub(crate) fn check_id(id: &str) -> Result<(), PersistenceError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_id() {
        assert!(check_id("composite-1f3a").is_ok());
        assert!(check_id("pipeline_2").is_ok());
        assert!(check_id("").is_err());
        assert!(check_id("../etc").is_err());
        assert!(check_id("a/b").is_err());
    }
}
