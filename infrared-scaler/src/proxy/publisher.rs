//! Pushes routing documents into Infrared's config API.

use async_trait::async_trait;
use infrared_scaler_common::ConfigDocument;
use log::debug;
use reqwest::{StatusCode, Url};

use crate::error::PublishError;
use crate::kubernetes::models::ServiceKey;

/// Whether a delete removed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    AlreadyAbsent,
}

/// Idempotent document store keyed by config id.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn exists(&self, config_id: &str) -> Result<bool, PublishError>;

    async fn upsert(&self, config_id: &str, document: &ConfigDocument) -> Result<(), PublishError>;

    /// Deleting a missing document is not an error.
    async fn delete(&self, config_id: &str) -> Result<Removal, PublishError>;
}

/// File path Infrared stores the document for `service` under.
pub fn config_id(config_path: &str, service: &ServiceKey) -> String {
    if config_path.is_empty() || config_path.ends_with('/') {
        format!("{}{}.yml", config_path, service.server_id())
    } else {
        format!("{}/{}.yml", config_path, service.server_id())
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfigStore {
    client: reqwest::Client,
    base: Url,
}

impl HttpConfigStore {
    pub fn new(base_url: &str) -> Result<Self, PublishError> {
        let base = Url::parse(base_url).map_err(|e| PublishError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(PublishError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a hierarchical url".to_string(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    /// `{base}/configs/{config_id}`, with the id encoded as one path segment.
    pub fn url_for(&self, config_id: &str) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("configs").push(config_id);
        }
        url
    }
}

async fn status_error(response: reqwest::Response) -> PublishError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    PublishError::Status { status, body }
}

#[async_trait]
impl ConfigStore for HttpConfigStore {
    async fn exists(&self, config_id: &str) -> Result<bool, PublishError> {
        let response = self.client.get(self.url_for(config_id)).send().await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(response).await),
        }
    }

    async fn upsert(&self, config_id: &str, document: &ConfigDocument) -> Result<(), PublishError> {
        debug!(target: "publisher", "PUT {}", config_id);
        let response = self
            .client
            .put(self.url_for(config_id))
            .json(document)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn delete(&self, config_id: &str) -> Result<Removal, PublishError> {
        debug!(target: "publisher", "DELETE {}", config_id);
        let response = self.client.delete(self.url_for(config_id)).send().await?;
        match response.status() {
            s if s.is_success() => Ok(Removal::Deleted),
            StatusCode::NOT_FOUND => Ok(Removal::AlreadyAbsent),
            _ => Err(status_error(response).await),
        }
    }
}
