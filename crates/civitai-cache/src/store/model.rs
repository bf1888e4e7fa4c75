//! Model tier: the cached versions of one model.

use super::lock::DirLock;
use super::sync::SyncContext;
use super::tree::TreeNode;
use super::version::VersionManager;
use super::{entry_dir_name, list_entry_dirs, remove_tree, EntryDir};
use crate::catalog::{find_version, ModelRecord, ModelRef, VersionRef};
use crate::error::{CacheError, Result};
use crate::naming::soft_strip_name;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manager for one `<norm-model>__<model-id>` folder.
#[derive(Debug, Clone)]
pub struct ModelManager {
    root_dir: PathBuf,
    model: ModelRef,
    /// Catalog record, when the model was resolved online.
    record: Option<ModelRecord>,
    ctx: SyncContext,
}

impl ModelManager {
    /// Manager for a model already resolved against the catalog.
    pub fn online(
        root_dir: impl Into<PathBuf>,
        model: ModelRef,
        record: ModelRecord,
        ctx: SyncContext,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            model,
            record: Some(record),
            ctx,
        }
    }

    /// Manager for a model known only from its cache folder.
    ///
    /// Version resolution stays local for the lifetime of this manager.
    pub fn local(root_dir: impl Into<PathBuf>, model: ModelRef, ctx: SyncContext) -> Self {
        Self {
            root_dir: root_dir.into(),
            model,
            record: None,
            ctx,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    /// Find a cached version folder.
    ///
    /// `None` selects the highest version id present locally.
    fn find_local_version(&self, version: Option<&VersionRef>) -> Result<EntryDir> {
        let entries = list_entry_dirs(&self.root_dir)?;

        let Some(wanted) = version else {
            return entries
                .into_iter()
                .max_by_key(|e| e.id)
                .ok_or_else(|| CacheError::LocalVersionNotFound {
                    model: self.model.to_string(),
                    version: "<latest>".to_string(),
                });
        };

        let key = soft_strip_name(&wanted.as_text());
        let mut matched: Vec<EntryDir> = entries
            .into_iter()
            .filter(|e| e.name == key || wanted.as_id() == Some(e.id))
            .collect();

        match matched.len() {
            0 => Err(CacheError::LocalVersionNotFound {
                model: self.model.to_string(),
                version: wanted.as_text(),
            }),
            1 => Ok(matched.remove(0)),
            _ => Err(CacheError::LocalVersionDuplicated {
                model: self.model.to_string(),
                version: wanted.as_text(),
                candidates: matched.iter().map(EntryDir::dir_name).collect(),
            }),
        }
    }

    /// Resolve the version tier for a request, online when possible.
    pub async fn version_manager(&self, version: Option<&VersionRef>) -> Result<VersionManager> {
        if let Some(version) = version {
            version.validate()?;
        }
        let _lock = DirLock::acquire(&self.root_dir).await?;

        let online = match &self.record {
            Some(record) => {
                self.ctx
                    .try_online(&record.name, async {
                        Ok((record.clone(), find_version(record, version)?.clone()))
                    })
                    .await?
            }
            None => None,
        };

        match online {
            Some((record, version_record)) => {
                let dir = self
                    .root_dir
                    .join(entry_dir_name(&version_record.name, version_record.id));
                std::fs::create_dir_all(&dir).map_err(|e| CacheError::io_with_path(e, &dir))?;
                debug!(
                    "Resolved {} / {} online to {}",
                    record.name,
                    version_record.name,
                    dir.display()
                );
                Ok(VersionManager::online(
                    dir,
                    self.model.clone(),
                    record,
                    version_record,
                    self.ctx.clone(),
                ))
            }
            None => {
                let entry = self.find_local_version(version)?;
                debug!("Resolved {} locally to {}", self.model, entry.path.display());
                Ok(VersionManager::local(
                    entry.path,
                    self.model.clone(),
                    entry.name,
                    self.ctx.clone(),
                ))
            }
        }
    }

    /// Local path of a file of this model.
    pub async fn get_file(
        &self,
        version: Option<&VersionRef>,
        pattern: Option<&str>,
    ) -> Result<PathBuf> {
        self.version_manager(version).await?.get_file(pattern).await
    }

    /// Cached versions, by version id.
    pub async fn list_versions(&self) -> Result<Vec<VersionManager>> {
        let _lock = DirLock::acquire(&self.root_dir).await?;
        Ok(list_entry_dirs(&self.root_dir)?
            .into_iter()
            .map(|e| VersionManager::local(e.path, self.model.clone(), e.name, self.ctx.clone()))
            .collect())
    }

    /// Remove one cached version and everything in it.
    pub async fn delete_version(&self, version: &VersionRef) -> Result<()> {
        version.validate()?;
        let _lock = DirLock::acquire(&self.root_dir).await?;

        let entry = self.find_local_version(Some(version))?;
        // Wait out anyone using the version before pulling it away.
        drop(DirLock::acquire(&entry.path).await?);
        remove_tree(&entry.path)?;

        info!("Deleted version {} of {}", entry.dir_name(), self.model);
        Ok(())
    }

    pub async fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for version in self.list_versions().await? {
            total += version.total_size().await?;
        }
        Ok(total)
    }

    pub async fn tree(&self) -> Result<TreeNode> {
        let mut children = Vec::new();
        for version in self.list_versions().await? {
            children.push(version.tree().await?);
        }
        Ok(TreeNode::with_children(self.to_string(), children))
    }
}

impl fmt::Display for ModelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ModelManager model: {}>", self.model)
    }
}
