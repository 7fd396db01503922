//! Scoped ownership of every temporary file a request creates.
//!
//! Each request gets its own uniquely-named directory under the configured
//! temp root. Anything the pipeline writes goes in there, and the directory
//! is removed when the scope is closed or dropped, whichever comes first.

mod scope;

pub use scope::TransientScope;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{info, warn};

pub(crate) const SCOPE_DIR_PREFIX: &str = "req-";

/// The parent directory under which request scopes are created.
#[derive(Debug, Clone)]
pub struct TransientRoot {
    path: PathBuf,
}

impl TransientRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the root directory if needed.
    pub async fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.path).await
    }

    /// Opens a fresh scope for one request.
    pub fn open_scope(&self) -> std::io::Result<TransientScope> {
        self.open_scope_for(&uuid::Uuid::new_v4().to_string())
    }

    /// Opens the scope of `request_id`, in a directory named after it.
    pub fn open_scope_for(&self, request_id: &str) -> std::io::Result<TransientScope> {
        TransientScope::open(&self.path, request_id)
    }

    /// Removes request directories older than `max_age`.
    ///
    /// Scopes clean up after themselves, so anything found here was left by a
    /// process that was killed mid-request.
    pub async fn sweep_stale(&self, max_age: Duration) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = match fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let now = SystemTime::now();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(SCOPE_DIR_PREFIX) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale scope {:?}: {}", entry.path(), e),
            }
        }

        if removed > 0 {
            info!("Removed {} stale request directories from {:?}", removed, self.path);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweep_removes_only_old_scope_dirs() {
        let dir = TempDir::new().unwrap();
        let root = TransientRoot::new(dir.path());
        std::fs::create_dir(dir.path().join("req-leftover")).unwrap();
        std::fs::write(dir.path().join("req-leftover/capture.wav"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("keep-me")).unwrap();

        let removed = root.sweep_stale(Duration::ZERO).await.unwrap();

        assert_eq!(removed, 1);
        assert!(!dir.path().join("req-leftover").exists());
        assert!(dir.path().join("keep-me").exists());
    }

    #[tokio::test]
    async fn test_sweep_keeps_recent_scope_dirs() {
        let dir = TempDir::new().unwrap();
        let root = TransientRoot::new(dir.path());
        std::fs::create_dir(dir.path().join("req-active")).unwrap();

        let removed = root.sweep_stale(Duration::from_secs(3600)).await.unwrap();

        assert_eq!(removed, 0);
        assert!(dir.path().join("req-active").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_root_is_noop() {
        let dir = TempDir::new().unwrap();
        let root = TransientRoot::new(dir.path().join("does-not-exist"));
        assert_eq!(root.sweep_stale(Duration::ZERO).await.unwrap(), 0);
    }
}
