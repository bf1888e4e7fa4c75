//! Version tier: the cached files of one model version.
//!
//! A version folder holds the file bytes under `files/`, one uppercase
//! SHA-256 record per file under `hashes/`, and a `primary` marker naming the
//! version's primary file. Every operation runs under the folder's lock.

use super::atomic::{read_first_line, remove_if_exists, write_line_atomic};
use super::lock::DirLock;
use super::sync::SyncContext;
use super::tree::TreeNode;
use crate::catalog::{find_resource, ModelRecord, ModelRef, Resource, VersionRecord};
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use crate::hashing::verify_sha256;
use crate::naming::compile_pattern;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A cached file as recorded on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub filename: String,
    /// Uppercase hex SHA-256 from the hash record.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
    pub is_primary: bool,
}

impl fmt::Display for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LocalFile(filename='{}', hash='{}', size={}, is_primary={})",
            self.filename, self.hash, self.size, self.is_primary
        )
    }
}

/// Manager for one `<norm-version>__<version-id>` folder.
#[derive(Debug, Clone)]
pub struct VersionManager {
    root_dir: PathBuf,
    model: ModelRef,
    version: String,
    /// Resolved catalog records; `None` for a purely local manager.
    remote: Option<(ModelRecord, VersionRecord)>,
    ctx: SyncContext,
}

impl VersionManager {
    /// Manager that syncs against the given catalog records before serving.
    pub fn online(
        root_dir: impl Into<PathBuf>,
        model: ModelRef,
        model_record: ModelRecord,
        version_record: VersionRecord,
        ctx: SyncContext,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            model,
            version: version_record.name.clone(),
            remote: Some((model_record, version_record)),
            ctx,
        }
    }

    /// Manager over what is already cached; never touches the catalog.
    pub fn local(
        root_dir: impl Into<PathBuf>,
        model: ModelRef,
        version: impl Into<String>,
        ctx: SyncContext,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            model,
            version: version.into(),
            remote: None,
            ctx,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn files_dir(&self) -> PathBuf {
        self.root_dir.join(StoreConfig::FILES_DIR_NAME)
    }

    fn file_path(&self, filename: &str) -> PathBuf {
        self.files_dir().join(filename)
    }

    fn hash_path(&self, filename: &str) -> PathBuf {
        self.root_dir
            .join(StoreConfig::HASHES_DIR_NAME)
            .join(format!("{}{}", filename, StoreConfig::HASH_SUFFIX))
    }

    fn primary_path(&self) -> PathBuf {
        self.root_dir.join(StoreConfig::PRIMARY_FILE_NAME)
    }

    fn primary_file(&self) -> Result<Option<String>> {
        read_first_line(&self.primary_path())
    }

    /// Local (hash, size) of a cached file; `None` for whatever is missing.
    fn file_meta(&self, filename: &str) -> Result<(Option<String>, Option<u64>)> {
        let hash = read_first_line(&self.hash_path(filename))?;
        let size = match std::fs::metadata(self.file_path(filename)) {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(CacheError::io_with_path(e, self.file_path(filename))),
        };
        Ok((hash, size))
    }

    /// Names of everything under `files/`, sorted.
    fn cached_filenames(&self) -> Result<Vec<String>> {
        let dir = self.files_dir();
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io_with_path(e, &dir)),
        };

        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CacheError::io_with_path(e, &dir))?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn need_download(&self, resource: &Resource) -> Result<bool> {
        let (hash, size) = self.file_meta(&resource.filename)?;
        Ok(match (hash, size) {
            (Some(hash), Some(size)) => {
                size != resource.size || !hash.eq_ignore_ascii_case(&resource.sha256)
            }
            _ => true,
        })
    }

    /// Download `resource` into a staging directory, verify it, then move it
    /// into place and update the hash record and primary marker.
    async fn download(&self, resource: &Resource) -> Result<()> {
        validate_filename(&resource.filename)?;
        std::fs::create_dir_all(&self.root_dir)
            .map_err(|e| CacheError::io_with_path(e, &self.root_dir))?;

        let staging = tempfile::Builder::new()
            .prefix(StoreConfig::STAGING_PREFIX)
            .tempdir_in(&self.root_dir)
            .map_err(|e| CacheError::io_with_path(e, &self.root_dir))?;
        let staged = staging.path().join(&resource.filename);

        let written = self.ctx.catalog().download(&resource.url, &staged).await?;
        if written != resource.size {
            return Err(CacheError::SizeMismatch {
                filename: resource.filename.clone(),
                expected: resource.size,
                actual: written,
            });
        }
        if self.ctx.verify_hash() && !resource.sha256.is_empty() {
            verify_sha256(&staged, &resource.sha256).await?;
        }

        let files_dir = self.files_dir();
        std::fs::create_dir_all(&files_dir).map_err(|e| CacheError::io_with_path(e, &files_dir))?;
        let target = self.file_path(&resource.filename);
        std::fs::rename(&staged, &target).map_err(|e| CacheError::Io {
            message: format!(
                "Failed to move {} into {}",
                staged.display(),
                target.display()
            ),
            path: Some(target.clone()),
            source: Some(e),
        })?;

        write_line_atomic(
            &self.hash_path(&resource.filename),
            &resource.sha256.to_uppercase(),
        )?;
        if resource.is_primary {
            write_line_atomic(&self.primary_path(), &resource.filename)?;
        }

        info!(
            "Cached {} ({} bytes) for {} / {}",
            resource.filename, resource.size, resource.model_name, resource.version_name
        );
        Ok(())
    }

    /// Bring the requested file up to date with the catalog, if online.
    ///
    /// Connectivity failures (during resolution or download) leave the cache
    /// as it was; the caller then serves whatever is already there.
    async fn try_sync(&self, pattern: Option<&str>) -> Result<()> {
        let Some((model, version)) = &self.remote else {
            return Ok(());
        };

        let what = format!("{} / {}", model.name, version.name);
        self.ctx
            .try_online(&what, async {
                let resource = find_resource(model, version, pattern)?;
                debug!("Resource found in catalog: {:?}", resource);
                if self.need_download(&resource)? {
                    debug!("{} is missing or outdated locally", resource.filename);
                    self.download(&resource).await?;
                } else {
                    debug!("{} is up to date", resource.filename);
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Pick one cached file: the recorded primary when `pattern` is `None`,
    /// otherwise the single cached filename matching the glob.
    fn select_local(&self, pattern: Option<&str>) -> Result<PathBuf> {
        let filenames = self.cached_filenames()?;
        let (label, matched): (String, Vec<String>) = match pattern {
            None => {
                let primary = self
                    .primary_file()?
                    .ok_or_else(|| CacheError::PrimaryFileUnset {
                        model: self.model.to_string(),
                        version: self.version.clone(),
                    })?;
                let matched = filenames.into_iter().filter(|f| *f == primary).collect();
                (primary, matched)
            }
            Some(pattern) => {
                let matcher = compile_pattern(pattern)?;
                let matched = filenames
                    .into_iter()
                    .filter(|f| matcher.is_match(f))
                    .collect();
                (pattern.to_string(), matched)
            }
        };

        match matched.len() {
            0 => Err(CacheError::LocalFileNotFound {
                model: self.model.to_string(),
                version: self.version.clone(),
                pattern: label,
            }),
            1 => Ok(self.file_path(&matched[0])),
            _ => Err(CacheError::LocalFileDuplicated {
                model: self.model.to_string(),
                version: self.version.clone(),
                pattern: label,
                candidates: matched,
            }),
        }
    }

    /// Local path of the requested file, downloading it first when online
    /// and the cached copy is missing or stale.
    pub async fn get_file(&self, pattern: Option<&str>) -> Result<PathBuf> {
        if let Some(pattern) = pattern {
            compile_pattern(pattern)?;
        }

        let _lock = DirLock::acquire(&self.root_dir).await?;
        self.try_sync(pattern).await?;
        self.select_local(pattern)
    }

    /// Cached files that have both bytes and a hash record, by filename.
    pub async fn list_files(&self) -> Result<Vec<LocalFile>> {
        let _lock = DirLock::acquire(&self.root_dir).await?;
        self.list_files_locked()
    }

    fn list_files_locked(&self) -> Result<Vec<LocalFile>> {
        let primary = self.primary_file()?;
        let mut files = Vec::new();
        for filename in self.cached_filenames()? {
            let (Some(hash), Some(size)) = self.file_meta(&filename)? else {
                continue;
            };
            files.push(LocalFile {
                is_primary: primary.as_deref() == Some(filename.as_str()),
                filename,
                hash,
                size,
            });
        }
        Ok(files)
    }

    /// Delete one cached file with its hash record, clearing the primary
    /// marker when it names that file.
    pub async fn delete_file(&self, filename: &str) -> Result<()> {
        validate_filename(filename)?;
        let _lock = DirLock::acquire(&self.root_dir).await?;

        let path = self.file_path(filename);
        if !path.is_file() {
            return Err(CacheError::LocalFileNotFound {
                model: self.model.to_string(),
                version: self.version.clone(),
                pattern: filename.to_string(),
            });
        }

        remove_if_exists(&path)?;
        remove_if_exists(&self.hash_path(filename))?;
        if self.primary_file()?.as_deref() == Some(filename) {
            remove_if_exists(&self.primary_path())?;
        }

        info!("Deleted cached file {} from {}", filename, self);
        Ok(())
    }

    /// Total bytes of the listed files.
    pub async fn total_size(&self) -> Result<u64> {
        Ok(self.list_files().await?.iter().map(|f| f.size).sum())
    }

    pub async fn tree(&self) -> Result<TreeNode> {
        let files = self.list_files().await?;
        Ok(TreeNode::with_children(
            self.to_string(),
            files.iter().map(|f| TreeNode::new(f.to_string())).collect(),
        ))
    }
}

impl fmt::Display for VersionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<VersionManager model: {}, version: '{}'>",
            self.model, self.version
        )
    }
}

/// Catalog filenames become path components; refuse anything that could
/// escape `files/`.
fn validate_filename(filename: &str) -> Result<()> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\');
    if bad {
        Err(CacheError::invalid_argument(
            "filename",
            format!("unsafe file name {:?}", filename),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogSource};
    use crate::config::CacheConfig;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct NoCatalog;

    #[async_trait]
    impl CatalogSource for NoCatalog {
        async fn model_by_id(&self, _id: i64) -> Result<Option<ModelRecord>> {
            Err(CacheError::OfflineMode)
        }
        async fn search_models(&self, _query: &str) -> Result<Vec<ModelRecord>> {
            Err(CacheError::OfflineMode)
        }
        async fn version_by_hash(&self, _hash: &str) -> Result<Option<VersionRecord>> {
            Err(CacheError::OfflineMode)
        }
        async fn download(&self, _url: &str, _dest: &Path) -> Result<u64> {
            Err(CacheError::OfflineMode)
        }
    }

    fn local_manager(root: &Path) -> VersionManager {
        let config = CacheConfig::new(root);
        let ctx = SyncContext::new(Catalog::new(Arc::new(NoCatalog)), &config);
        VersionManager::local(root.join("v1_0__124870"), ModelRef::Id(115427), "v1_0", ctx)
    }

    fn seed(manager: &VersionManager, filename: &str, bytes: &[u8], primary: bool) {
        std::fs::create_dir_all(manager.files_dir()).unwrap();
        std::fs::write(manager.file_path(filename), bytes).unwrap();
        write_line_atomic(&manager.hash_path(filename), "ABCDEF").unwrap();
        if primary {
            write_line_atomic(&manager.primary_path(), filename).unwrap();
        }
    }

    #[tokio::test]
    async fn test_local_primary_and_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let manager = local_manager(temp_dir.path());
        seed(&manager, "amiya.pt", b"amiya", true);
        seed(&manager, "amiya_preview.png", b"png", false);

        let primary = manager.get_file(None).await.unwrap();
        assert!(primary.ends_with("files/amiya.pt"));

        let png = manager.get_file(Some("*.png")).await.unwrap();
        assert!(png.ends_with("files/amiya_preview.png"));

        let err = manager.get_file(Some("amiya*")).await.unwrap_err();
        assert!(matches!(err, CacheError::LocalFileDuplicated { .. }));

        let err = manager.get_file(Some("*.safetensors")).await.unwrap_err();
        assert!(matches!(err, CacheError::LocalFileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_primary_unset() {
        let temp_dir = TempDir::new().unwrap();
        let manager = local_manager(temp_dir.path());
        seed(&manager, "amiya.pt", b"amiya", false);

        let err = manager.get_file(None).await.unwrap_err();
        assert!(matches!(err, CacheError::PrimaryFileUnset { .. }));
    }

    #[tokio::test]
    async fn test_list_files_requires_hash_record() {
        let temp_dir = TempDir::new().unwrap();
        let manager = local_manager(temp_dir.path());
        seed(&manager, "amiya.pt", b"amiya", true);
        std::fs::write(manager.file_path("orphan.bin"), b"x").unwrap();

        let files = manager.list_files().await.unwrap();
        assert_eq!(
            files,
            vec![LocalFile {
                filename: "amiya.pt".into(),
                hash: "ABCDEF".into(),
                size: 5,
                is_primary: true,
            }]
        );
        assert_eq!(manager.total_size().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_delete_file_clears_primary() {
        let temp_dir = TempDir::new().unwrap();
        let manager = local_manager(temp_dir.path());
        seed(&manager, "amiya.pt", b"amiya", true);
        seed(&manager, "amiya_preview.png", b"png", false);

        manager.delete_file("amiya.pt").await.unwrap();
        assert!(!manager.file_path("amiya.pt").exists());
        assert!(!manager.hash_path("amiya.pt").exists());
        assert_eq!(manager.primary_file().unwrap(), None);
        assert!(manager.file_path("amiya_preview.png").exists());

        assert!(matches!(
            manager.delete_file("amiya.pt").await,
            Err(CacheError::LocalFileNotFound { .. })
        ));
        assert!(manager.delete_file("../escape").await.is_err());
    }

    #[tokio::test]
    async fn test_tree_rendering() {
        let temp_dir = TempDir::new().unwrap();
        let manager = local_manager(temp_dir.path());
        seed(&manager, "amiya.pt", b"amiya", true);

        let rendered = manager.tree().await.unwrap().to_string();
        assert_eq!(
            rendered,
            "<VersionManager model: 115427, version: 'v1_0'>\n\
             └── LocalFile(filename='amiya.pt', hash='ABCDEF', size=5, is_primary=true)\n"
        );
    }
}
