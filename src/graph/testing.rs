//! Mock renderer and object store for testing

use super::publisher::{ObjectStore, StoreError};
use super::renderer::{GraphRenderer, RenderError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Renderer
// ============================================================================

/// Renderer that writes a fake PNG instead of running an interpreter
pub struct MockRenderer {
    output_dir: PathBuf,
    fail_with: Option<String>,
    /// Code passed to each render call
    pub renders: Mutex<Vec<String>>,
}

impl MockRenderer {
    pub fn succeeding(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            fail_with: None,
            renders: Mutex::new(Vec::new()),
        }
    }

    /// Every render fails with a non-zero exit carrying `stderr`
    pub fn failing(stderr: impl Into<String>) -> Self {
        Self {
            output_dir: std::env::temp_dir(),
            fail_with: Some(stderr.into()),
            renders: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_renders(&self) -> Vec<String> {
        self.renders.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphRenderer for MockRenderer {
    async fn render(&self, code: &str, _cancel: CancellationToken) -> Result<PathBuf, RenderError> {
        self.renders.lock().unwrap().push(code.to_string());

        if code.trim().is_empty() {
            return Err(RenderError::NoCode);
        }
        if let Some(stderr) = &self.fail_with {
            return Err(RenderError::Failed {
                code: Some(1),
                stderr: stderr.clone(),
            });
        }

        let count = self.renders.lock().unwrap().len();
        let path = self.output_dir.join(format!("graph_mock_{count}.png"));
        std::fs::write(&path, b"\x89PNG mock")?;
        Ok(path)
    }
}

// ============================================================================
// Mock Object Store
// ============================================================================

/// Object store that records uploads and either succeeds or fails
pub struct MockObjectStore {
    base_url: Option<String>,
    /// (local path, key) for each upload attempt
    pub uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl MockObjectStore {
    pub fn succeeding(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            base_url: None,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StoreError> {
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), key.to_string()));

        match &self.base_url {
            Some(base) => Ok(format!("{base}/{key}")),
            None => Err(StoreError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            }),
        }
    }
}
