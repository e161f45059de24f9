//! Artifact publisher - turns a rendered image into a fetchable reference
//!
//! Uploads go to a public object store bucket when one is configured.
//! Anything else (no bucket, upload error) falls back to a path under the
//! local static route, so publishing never fails for an existing image.

use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Static route that serves the renderer output directory
pub const LOCAL_ROUTE_PREFIX: &str = "/graph";
pub const DEFAULT_STORAGE_API_URL: &str = "https://storage.googleapis.com";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a published graph can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphReference {
    /// Absolute public URL in the object store
    Remote(String),
    /// Path under [`LOCAL_ROUTE_PREFIX`]
    Local(String),
}

impl GraphReference {
    pub fn as_str(&self) -> &str {
        match self {
            GraphReference::Remote(s) | GraphReference::Local(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            GraphReference::Remote(s) | GraphReference::Local(s) => s,
        }
    }

    #[cfg(test)]
    pub fn is_local(&self) -> bool {
        matches!(self, GraphReference::Local(_))
    }

    /// Build a reference for a locally served file name
    pub fn local(file_name: &str) -> Self {
        GraphReference::Local(format!("{LOCAL_ROUTE_PREFIX}/{file_name}"))
    }

    /// File name under the output directory, for local references
    pub fn local_file_name(&self) -> Option<&str> {
        match self {
            GraphReference::Local(path) => path
                .strip_prefix(LOCAL_ROUTE_PREFIX)
                .and_then(|rest| rest.strip_prefix('/'))
                .filter(|name| !name.is_empty() && !name.contains('/') && !name.contains("..")),
            GraphReference::Remote(_) => None,
        }
    }
}

impl fmt::Display for GraphReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upload rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Remote object store that can host public images
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `local_path` under `key`, make it public, return its URL
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StoreError>;
}

/// Object store settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub access_token: Option<String>,
    pub api_url: String,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            bucket: std::env::var("STORAGE_BUCKET").ok().filter(|s| !s.is_empty()),
            access_token: std::env::var("STORAGE_ACCESS_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            api_url: std::env::var("STORAGE_API_URL")
                .unwrap_or_else(|_| DEFAULT_STORAGE_API_URL.to_string()),
        }
    }
}

/// Google Cloud Storage (and Firebase Storage) JSON API client
pub struct CloudStorage {
    client: reqwest::Client,
    api_url: String,
    bucket: String,
    access_token: String,
}

impl CloudStorage {
    /// Returns `None` when the bucket or token is missing.
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        let bucket = config.bucket.clone()?;
        let access_token = config.access_token.clone()?;
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| tracing::error!(error = %e, "Failed to create storage client"))
            .ok()?;

        Some(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bucket,
            access_token,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.api_url, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for CloudStorage {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StoreError> {
        let bytes = tokio::fs::read(local_path).await?;

        let response = self
            .client
            .post(format!("{}/upload/storage/v1/b/{}/o", self.api_url, self.bucket))
            .query(&[
                ("uploadType", "media"),
                ("name", key),
                ("predefinedAcl", "publicRead"),
            ])
            .bearer_auth(&self.access_token)
            .header("Content-Type", "image/png")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(self.public_url(key))
    }
}

/// Publishes rendered images, preferring the remote store
#[derive(Clone, Default)]
pub struct ArtifactPublisher {
    store: Option<Arc<dyn ObjectStore>>,
}

impl ArtifactPublisher {
    /// Publisher that only produces local references
    pub fn local_only() -> Self {
        Self { store: None }
    }

    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        match CloudStorage::from_config(config) {
            Some(storage) => {
                tracing::info!(bucket = %storage.bucket, "Graph uploads enabled");
                Self::with_store(Arc::new(storage))
            }
            None => {
                tracing::warn!("STORAGE_BUCKET or STORAGE_ACCESS_TOKEN not set; graphs served locally");
                Self::local_only()
            }
        }
    }

    pub fn has_remote_store(&self) -> bool {
        self.store.is_some()
    }

    /// Publish an image. Never fails: upload problems fall back to a local reference.
    pub async fn publish(&self, image_path: &Path) -> GraphReference {
        if let Some(store) = &self.store {
            let key = object_key();
            match store.upload(image_path, &key).await {
                Ok(url) => {
                    tracing::info!(url = %url, "Graph uploaded");
                    return GraphReference::Remote(url);
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %image_path.display(), "Graph upload failed, serving locally");
                }
            }
        }

        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        GraphReference::local(&file_name)
    }
}

/// `graphs/<date>/<random>.png`
fn object_key() -> String {
    format!(
        "graphs/{}/{}.png",
        Utc::now().format("%Y-%m-%d"),
        uuid::Uuid::new_v4().simple()
    )
}
