//! JSON-over-HTTP persistence client
//!
//! Routes, relative to the configured base URL:
//!
//! | Operation          | Request                              |
//! |--------------------|--------------------------------------|
//! | composite create   | `POST   /composites`                 |
//! | composite get      | `GET    /composites/{id}`            |
//! | composite list     | `GET    /composites?category={cat}`  |
//! | composite update   | `PATCH  /composites/{id}`            |
//! | composite delete   | `DELETE /composites/{id}`            |
//! | pipeline save      | `POST   /pipelines`                  |
//! | pipeline list      | `GET    /pipelines`                  |
//! | pipeline get       | `GET    /pipelines/{id}`             |
//! | pipeline delete    | `DELETE /pipelines/{id}`             |
//!
//! Create and save answer `{"id": "..."}`. Any non-success status becomes
//! [`PersistenceError::Remote`] carrying the server's message.

use std::time::Duration;

use async_trait::async_trait;
use pipeline_engine::{
    Composite, CompositeId, CompositeMetadata, CompositePatch, PipelineDefinition,
    PipelineMetadata,
};
use serde::Deserialize;

use super::{check_id, CompositeService, PipelineService};
use crate::config::ClientConfig;
use crate::error::PersistenceError;

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

/// Error body shapes the service may answer with
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the composite and pipeline services
#[derive(Debug, Clone)]
pub struct HttpPersistence {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPersistence {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PersistenceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, PersistenceError> {
        Self::new(config.persistence_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn item_url(&self, collection: &str, id: &str) -> Result<String, PersistenceError> {
        check_id(id)?;
        Ok(format!("{}/{}/{}", self.base_url, collection, id))
    }
}

/// Turn a non-success response into a remote error
async fn check(response: reqwest::Response) -> Result<reqwest::Response, PersistenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let error = remote_error(status.as_u16(), &body);
    log::warn!("Persistence request failed: {}", error);
    Err(error)
}

fn remote_error(status: u16, body: &str) -> PersistenceError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| body.trim().to_string());
    let message = if message.is_empty() {
        format!("HTTP {}", status)
    } else {
        message
    };
    PersistenceError::Remote { status, message }
}

#[async_trait]
impl CompositeService for HttpPersistence {
    async fn create(&self, composite: &Composite) -> Result<CompositeId, PersistenceError> {
        let response = self
            .client
            .post(self.url("composites"))
            .json(composite)
            .send()
            .await?;
        let created: IdResponse = check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn get(&self, id: &str) -> Result<Composite, PersistenceError> {
        let response = self
            .client
            .get(self.item_url("composites", id)?)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn list(&self, category: Option<&str>) -> Result<Vec<CompositeMetadata>, PersistenceError> {
        let mut request = self.client.get(self.url("composites"));
        if let Some(category) = category {
            request = request.query(&[("category", category)]);
        }
        let response = request.send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update(&self, id: &str, patch: &CompositePatch) -> Result<Composite, PersistenceError> {
        let response = self
            .client
            .patch(self.item_url("composites", id)?)
            .json(patch)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        let response = self
            .client
            .delete(self.item_url("composites", id)?)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PipelineService for HttpPersistence {
    async fn save(&self, definition: &PipelineDefinition) -> Result<String, PersistenceError> {
        let response = self
            .client
            .post(self.url("pipelines"))
            .json(definition)
            .send()
            .await?;
        let saved: IdResponse = check(response).await?.json().await?;
        Ok(saved.id)
    }

    async fn list(&self) -> Result<Vec<PipelineMetadata>, PersistenceError> {
        let response = self.client.get(self.url("pipelines")).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn get(&self, id: &str) -> Result<PipelineDefinition, PersistenceError> {
        let response = self
            .client
            .get(self.item_url("pipelines", id)?)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        let response = self
            .client
            .delete(self.item_url("pipelines", id)?)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
