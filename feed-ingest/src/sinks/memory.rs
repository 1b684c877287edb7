use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::pipeline::{BlobStore, Lease, PipelineError};

#[derive(Debug, Default)]
struct Inner {
    blobs: BTreeMap<String, (String, String)>,
    leases: HashSet<String>,
}

/// In-process blob store. Clones share state, so a caller can keep a handle
/// to inspect what a pipeline wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, PipelineError> {
        self.inner
            .lock()
            .map_err(|_| PipelineError::Sink("memory store poisoned".to_string()))
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.lock().ok()?.blobs.get(path).map(|(body, _)| body.clone())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.lock().ok()?.blobs.get(path).map(|(_, ct)| ct.clone())
    }

    /// Stored paths in lexical order.
    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .map(|inner| inner.blobs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, path: &str) -> Result<bool, PipelineError> {
        Ok(self.lock()?.blobs.contains_key(path))
    }

    async fn read_text(&self, path: &str) -> Result<String, PipelineError> {
        self.lock()?
            .blobs
            .get(path)
            .map(|(body, _)| body.clone())
            .ok_or_else(|| PipelineError::Sink(format!("no blob at {path}")))
    }

    async fn write_text(&self, path: &str, content: &str, content_type: &str) -> Result<(), PipelineError> {
        self.lock()?
            .blobs
            .insert(path.to_string(), (content.to_string(), content_type.to_string()));
        Ok(())
    }

    async fn lease(&self, path: &str) -> Result<Lease, PipelineError> {
        if !self.lock()?.leases.insert(path.to_string()) {
            return Err(PipelineError::Sink(format!("lease on {path} is held by another writer")));
        }
        let inner = Arc::clone(&self.inner);
        let path = path.to_string();
        Ok(Lease::new(move || {
            if let Ok(mut inner) = inner.lock() {
                inner.leases.remove(&path);
            }
        }))
    }

    fn uri(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}
