//! Directory-backed persistence
//!
//! One pretty-printed JSON file per definition:
//! `<root>/composites/<id>.json` and `<root>/pipelines/<id>.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline_engine::{
    Composite, CompositeId, CompositeMetadata, CompositePatch, PipelineDefinition,
    PipelineMetadata,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use super::{check_id, CompositeService, PipelineService};
use crate::error::PersistenceError;

const COMPOSITES_DIR: &str = "composites";
const PIPELINES_DIR: &str = "pipelines";

/// Stores composites and pipelines as JSON files under a root directory
#[derive(Debug, Clone)]
pub struct FilePersistence {
    root: PathBuf,
}

impl FilePersistence {
    /// The directory is created on first write
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, kind: &str, id: &str) -> Result<PathBuf, PersistenceError> {
        check_id(id)?;
        Ok(self.root.join(kind).join(format!("{}.json", id)))
    }

    async fn write<T: Serialize>(&self, kind: &str, id: &str, value: &T) -> Result<(), PersistenceError> {
        let path = self.path(kind, id)?;
        fs::create_dir_all(self.root.join(kind)).await?;
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content).await?;
        log::debug!("Saved {} '{}' to {:?}", kind, id, path);
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, kind: &str, id: &str) -> Result<T, PersistenceError> {
        let path = self.path(kind, id)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn remove(&self, kind: &str, id: &str) -> Result<(), PersistenceError> {
        let path = self.path(kind, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                log::debug!("Deleted {} '{}'", kind, id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every parseable file of one kind; unreadable files are skipped
    async fn read_all<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<(String, T)>, PersistenceError> {
        let dir = self.root.join(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir).await?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_path = entry.path();
            if file_path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let Some(id) = file_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = id.to_string();
            let content = fs::read_to_string(&file_path).await?;
            match serde_json::from_str::<T>(&content) {
                Ok(item) => items.push((id, item)),
                Err(e) => log::warn!("Failed to parse {:?}: {}", file_path, e),
            }
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }
}

#[async_trait]
impl CompositeService for FilePersistence {
    async fn create(&self, composite: &Composite) -> Result<CompositeId, PersistenceError> {
        self.write(COMPOSITES_DIR, &composite.id, composite).await?;
        Ok(composite.id.clone())
    }

    async fn get(&self, id: &str) -> Result<Composite, PersistenceError> {
        self.read(COMPOSITES_DIR, id).await
    }

    async fn list(&self, category: Option<&str>) -> Result<Vec<CompositeMetadata>, PersistenceError> {
        let all = self.read_all::<Composite>(COMPOSITES_DIR).await?;
        Ok(all
            .into_iter()
            .map(|(_, c)| c)
            .filter(|c| category.map_or(true, |cat| c.category == cat))
            .map(|c| c.metadata())
            .collect())
    }

    async fn update(&self, id: &str, patch: &CompositePatch) -> Result<Composite, PersistenceError> {
        let mut composite: Composite = self.read(COMPOSITES_DIR, id).await?;
        composite.apply_patch(patch);
        self.write(COMPOSITES_DIR, id, &composite).await?;
        Ok(composite)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        self.remove(COMPOSITES_DIR, id).await
    }
}

#[async_trait]
impl PipelineService for FilePersistence {
    async fn save(&self, definition: &PipelineDefinition) -> Result<String, PersistenceError> {
        let id = definition
            .id
            .clone()
            .unwrap_or_else(|| format!("pipeline-{}", uuid::Uuid::new_v4()));
        let mut stored = definition.clone();
        stored.id = Some(id.clone());
        self.write(PIPELINES_DIR, &id, &stored).await?;
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<PipelineMetadata>, PersistenceError> {
        let all = self.read_all::<PipelineDefinition>(PIPELINES_DIR).await?;
        Ok(all.into_iter().map(|(id, d)| d.metadata(id)).collect())
    }

    async fn get(&self, id: &str) -> Result<PipelineDefinition, PersistenceError> {
        self.read(PIPELINES_DIR, id).await
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        self.remove(PIPELINES_DIR, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_engine::{Node, NodeKind, Subgraph};

    fn composite(id: &str, category: &str) -> Composite {
        Composite {
            id: id.to_string(),
            name: format!("Composite {}", id),
            description: String::new(),
            subgraph: Subgraph {
                nodes: vec![
                    Node::new("a", NodeKind::Function, "A"),
                    Node::new("b", NodeKind::Function, "B"),
                ],
                edges: Vec::new(),
            },
            inputs: Vec::new(),
            outputs: Vec::new(),
            category: category.to_string(),
            color: "#6366f1".to_string(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_composite_crud() {
        let dir = tempfile::tempdir().unwrap();
        let files = FilePersistence::new(dir.path());

        let id = files.create(&composite("c1", "math")).await.unwrap();
        files.create(&composite("c2", "io")).await.unwrap();
        assert_eq!(id, "c1");
        assert_eq!(
            CompositeService::get(&files, "c1").await.unwrap(),
            composite("c1", "math")
        );

        assert_eq!(CompositeService::list(&files, None).await.unwrap().len(), 2);
        let math = CompositeService::list(&files, Some("math")).await.unwrap();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].node_count, 2);

        let patch = CompositePatch {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        let updated = files.update("c1", &patch).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.version, 2);

        CompositeService::delete(&files, "c1").await.unwrap();
        assert!(matches!(
            CompositeService::get(&files, "c1").await,
            Err(PersistenceError::NotFound(_))
        ));
        assert!(matches!(
            CompositeService::delete(&files, "c1").await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pipeline_save_assigns_id() {
        let dir = tempfile::tempdir().unwrap();
        let files = FilePersistence::new(dir.path());

        let definition = PipelineDefinition {
            name: "Thumbnails".to_string(),
            nodes: vec![Node::new("n1", NodeKind::Function, "Resize")],
            ..Default::default()
        };
        let id = files.save(&definition).await.unwrap();
        assert!(id.starts_with("pipeline-"));

        let loaded = PipelineService::get(&files, &id).await.unwrap();
        assert_eq!(loaded.id.as_deref(), Some(id.as_str()));
        assert_eq!(loaded.nodes, definition.nodes);

        // Saving again with the id overwrites in place
        assert_eq!(files.save(&loaded).await.unwrap(), id);
        let listed = PipelineService::list(&files).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].node_count, 1);
    }

    #[tokio::test]
    async fn test_empty_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = FilePersistence::new(dir.path().join("missing"));
        assert!(PipelineService::list(&files).await.unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_ids() {
        let dir = tempfile::tempdir().unwrap();
        let files = FilePersistence::new(dir.path());
        let result = tokio_test::block_on(CompositeService::get(&files, "../secret"));
        assert!(matches!(result, Err(PersistenceError::InvalidId(_))));
    }
}
