use super::SCOPE_DIR_PREFIX;
use crate::audio::{AudioArtifact, AudioFormat};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Owns the temporary files of a single request.
///
/// Files are only ever deleted if they live inside the scope directory, so a
/// caller-owned `Local` artifact passed through `release`/`supersede` is left
/// alone.
pub struct TransientScope {
    request_id: String,
    dir: Option<TempDir>,
    held: Vec<PathBuf>,
}

impl TransientScope {
    pub(super) fn open(root: &Path, request_id: &str) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}{}", SCOPE_DIR_PREFIX, request_id))
            .rand_bytes(0)
            .tempdir_in(root)?;
        debug!("Opened transient scope {:?}", dir.path());
        Ok(Self {
            request_id: request_id.to_string(),
            dir: Some(dir),
            held: Vec::new(),
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The scope directory. Empty once the scope has been closed.
    pub fn path(&self) -> &Path {
        self.dir.as_ref().map(|d| d.path()).unwrap_or(Path::new(""))
    }

    /// Reserves a unique file path inside the scope and starts tracking it.
    pub fn allocate(&mut self, stem: &str, format: &AudioFormat) -> PathBuf {
        let name = format!("{}-{}.{}", stem, uuid::Uuid::new_v4(), format.extension());
        let path = self.path().join(name);
        self.held.push(path.clone());
        path
    }

    /// Whether `path` is a file this scope is responsible for deleting.
    pub fn owns(&self, path: &Path) -> bool {
        self.dir.is_some() && path.starts_with(self.path())
    }

    /// Number of tracked files that currently exist on disk.
    pub fn live_files(&self) -> usize {
        self.held.iter().filter(|p| p.exists()).count()
    }

    /// Deletes a scope-owned artifact right away.
    pub async fn release(&mut self, artifact: &AudioArtifact) -> std::io::Result<()> {
        self.discard(artifact.source_path()).await
    }

    /// Drops `original` now that `derivative` replaces it.
    pub async fn supersede(
        &mut self,
        original: &AudioArtifact,
        derivative: &AudioArtifact,
    ) -> std::io::Result<()> {
        if original.source_path() == derivative.source_path() {
            return Ok(());
        }
        debug!(
            "{:?} superseded by {:?}",
            original.source_path(),
            derivative.source_path()
        );
        self.discard(original.source_path()).await
    }

    /// Removes a scope-owned path, tolerating files that were never written.
    pub async fn discard(&mut self, path: &Path) -> std::io::Result<()> {
        if !self.owns(path) {
            return Ok(());
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.held.retain(|p| p != path);
        Ok(())
    }

    /// Tears the scope down, reporting any I/O error instead of hiding it in `Drop`.
    pub async fn close(mut self) -> std::io::Result<()> {
        self.held.clear();
        match self.dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                tokio::task::spawn_blocking(move || dir.close())
                    .await
                    .map_err(std::io::Error::other)??;
                debug!("Closed transient scope {:?}", path);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for TransientScope {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove transient scope {:?}: {}", path, e);
            } else {
                debug!("Dropped transient scope {:?}", path);
            }
        }
    }
}
