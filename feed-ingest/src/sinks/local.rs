use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use fs2::FileExt;

use crate::pipeline::{BlobStore, Lease, PipelineError};

/// Blob store on a local directory. Blob paths are relative, `/`-separated
/// and may not escape the root.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, PipelineError> {
        let rel = Path::new(path);
        let clean = !path.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(PipelineError::Sink(format!("invalid blob path {path:?}")));
        }
        Ok(self.root.join(rel))
    }
}

fn sink_err(action: &str, path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::Sink(format!("failed to {action} {}: {e}", path.display()))
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn exists(&self, path: &str) -> Result<bool, PipelineError> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| sink_err("stat", &full, e))
    }

    async fn read_text(&self, path: &str) -> Result<String, PipelineError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| sink_err("read", &full, e))
    }

    async fn write_text(&self, path: &str, content: &str, content_type: &str) -> Result<(), PipelineError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| sink_err("create directory", parent, e))?;
        }

        // Readers never see a half-written blob.
        let tmp = full.with_extension(format!("tmp-{}", std::process::id()));
        tokio::fs::write(&tmp, content.as_bytes())
            .await
            .map_err(|e| sink_err("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &full)
            .await
            .map_err(|e| sink_err("rename into", &full, e))?;

        metrics::counter!("blob_writes_total").increment(1);
        tracing::debug!(path = %full.display(), content_type, bytes = content.len(), "blob written");
        Ok(())
    }

    async fn lease(&self, path: &str) -> Result<Lease, PipelineError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| sink_err("create directory", parent, e))?;
        }

        let mut lease_name = full.clone().into_os_string();
        lease_name.push(".lease");
        let lease_path = PathBuf::from(lease_name);

        // The kernel drops the lock when the holder exits, so a marker left by
        // a killed run never blocks later ones.
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lease_path)
            .map_err(|e| sink_err("open lease", &lease_path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Lease::new(move || {
                if let Err(e) = FileExt::unlock(&file) {
                    tracing::warn!(path = %lease_path.display(), error = %e, "failed to release lease");
                }
            })),
            Err(e)
                if e.kind() == ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                metrics::counter!("blob_lease_conflicts_total").increment(1);
                Err(PipelineError::Sink(format!("lease on {path} is held by another writer")))
            }
            Err(e) => Err(sink_err("lock lease", &lease_path, e)),
        }
    }

    fn uri(&self, path: &str) -> String {
        format!("file://{}", self.root.join(path).display())
    }
}
