//! Root tier: one folder per cached model.

use super::lock::DirLock;
use super::model::ModelManager;
use super::sync::SyncContext;
use super::tree::TreeNode;
use super::{entry_dir_name, list_entry_dirs, remove_tree, EntryDir};
use crate::api::FileRequest;
use crate::catalog::{ModelRef, VersionRef};
use crate::error::{CacheError, Result};
use crate::naming::soft_strip_name;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Entry point of the cache hierarchy.
#[derive(Debug, Clone)]
pub struct DispatchManager {
    root_dir: PathBuf,
    ctx: SyncContext,
}

impl DispatchManager {
    /// Create a manager over `root_dir`, creating the directory if needed.
    pub fn new(root_dir: impl Into<PathBuf>, ctx: SyncContext) -> Result<Self> {
        let root_dir = root_dir.into();
        std::fs::create_dir_all(&root_dir).map_err(|e| CacheError::io_with_path(e, &root_dir))?;
        Ok(Self { root_dir, ctx })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Find a cached model folder by normalized name or id.
    ///
    /// Creator constraints are not recorded on disk and are ignored here.
    fn find_local_model(&self, model: &ModelRef) -> Result<EntryDir> {
        let key = soft_strip_name(&model.as_text());
        let id = model.as_id();
        let mut matched: Vec<EntryDir> = list_entry_dirs(&self.root_dir)?
            .into_iter()
            .filter(|e| e.name == key || id == Some(e.id))
            .collect();

        match matched.len() {
            0 => Err(CacheError::LocalModelNotFound {
                model: model.to_string(),
            }),
            1 => Ok(matched.remove(0)),
            _ => Err(CacheError::LocalModelDuplicated {
                model: model.to_string(),
                candidates: matched.iter().map(EntryDir::dir_name).collect(),
            }),
        }
    }

    /// Resolve the model tier for a request, online when possible.
    ///
    /// Online resolution creates the model folder; local resolution only
    /// finds existing ones.
    pub async fn model_manager(
        &self,
        model: &ModelRef,
        creator: Option<&str>,
    ) -> Result<ModelManager> {
        model.validate()?;
        let _lock = DirLock::acquire(&self.root_dir).await?;

        let what = model.to_string();
        let online = self
            .ctx
            .try_online(&what, self.ctx.catalog().find_model(model, creator))
            .await?;

        match online {
            Some(record) => {
                let dir = self.root_dir.join(entry_dir_name(&record.name, record.id));
                std::fs::create_dir_all(&dir).map_err(|e| CacheError::io_with_path(e, &dir))?;
                debug!("Resolved model {} online to {}", model, dir.display());
                Ok(ModelManager::online(
                    dir,
                    model.clone(),
                    record,
                    self.ctx.clone(),
                ))
            }
            None => {
                let entry = self.find_local_model(model)?;
                debug!("Resolved model {} locally to {}", model, entry.path.display());
                Ok(ModelManager::local(
                    entry.path,
                    model.clone(),
                    self.ctx.clone(),
                ))
            }
        }
    }

    /// Local path of the requested file, fetching it first when online.
    pub async fn get_file(&self, request: &FileRequest) -> Result<PathBuf> {
        request.validate()?;
        let manager = self
            .model_manager(&request.model, request.creator.as_deref())
            .await?;
        manager
            .get_file(request.version.as_ref(), request.pattern.as_deref())
            .await
    }

    /// Cached models, by model id.
    pub async fn list_models(&self) -> Result<Vec<ModelManager>> {
        let _lock = DirLock::acquire(&self.root_dir).await?;
        Ok(list_entry_dirs(&self.root_dir)?
            .into_iter()
            .map(|e| ModelManager::local(e.path, ModelRef::Id(e.id), self.ctx.clone()))
            .collect())
    }

    /// Remove a cached model with all its versions.
    pub async fn delete_model(&self, model: &ModelRef) -> Result<()> {
        model.validate()?;
        let _lock = DirLock::acquire(&self.root_dir).await?;

        let entry = self.find_local_model(model)?;
        drop(DirLock::acquire(&entry.path).await?);
        remove_tree(&entry.path)?;

        info!("Deleted model {} from the cache", entry.dir_name());
        Ok(())
    }

    /// Remove one cached version of a model, leaving its siblings.
    pub async fn delete_version(&self, model: &ModelRef, version: &VersionRef) -> Result<()> {
        model.validate()?;
        let entry = {
            let _lock = DirLock::acquire(&self.root_dir).await?;
            self.find_local_model(model)?
        };
        ModelManager::local(entry.path, model.clone(), self.ctx.clone())
            .delete_version(version)
            .await
    }

    pub async fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for model in self.list_models().await? {
            total += model.total_size().await?;
        }
        Ok(total)
    }

    pub async fn tree(&self) -> Result<TreeNode> {
        let mut children = Vec::new();
        for model in self.list_models().await? {
            children.push(model.tree().await?);
        }
        Ok(TreeNode::with_children(self.to_string(), children))
    }
}

impl fmt::Display for DispatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<DispatchManager directory: '{}'>",
            self.root_dir.display()
        )
    }
}
