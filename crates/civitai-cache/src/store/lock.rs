//! Advisory directory locks.
//!
//! Each tier directory carries a `.filelock`; holding an exclusive `fs2` lock
//! on it serializes mutation of that directory across processes. The lock is
//! released when the guard is dropped, on every exit path.

use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive lock on a tier directory.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Create `dir` if needed and block (on the blocking pool) until its
    /// lock file is exclusively held.
    pub async fn acquire(dir: &Path) -> Result<Self> {
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(&dir))
            .await
            .map_err(|e| CacheError::Other(format!("Lock task failed: {}", e)))?
    }

    fn acquire_blocking(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CacheError::io_with_path(e, dir))?;
        let path = dir.join(StoreConfig::LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CacheError::io_with_path(e, &path))?;

        FileExt::lock_exclusive(&file).map_err(|e| CacheError::io_with_path(e, &path))?;
        debug!("Locked {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_acquire_creates_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("model__1");

        let _lock = DirLock::acquire(&dir).await.unwrap();
        assert!(dir.join(".filelock").exists());
    }

    #[tokio::test]
    async fn test_lock_is_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        {
            let _lock = DirLock::acquire(temp_dir.path()).await.unwrap();
        }
        // Re-acquiring would block forever if the first guard leaked.
        let _again = DirLock::acquire(temp_dir.path()).await.unwrap();
    }
}
