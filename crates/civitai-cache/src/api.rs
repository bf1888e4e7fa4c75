//! Top-level facade combining the catalog resolver and the cache store.
//!
//! ```no_run
//! use civitai_cache::{CacheConfig, FileRequest, ModelCache};
//!
//! # async fn example() -> civitai_cache::Result<()> {
//! let cache = ModelCache::new(CacheConfig::from_env()?)?;
//! let path = cache
//!     .get_file(&FileRequest::new("Cetus-Mix").version("V4").pattern("*.vae.pt"))
//!     .await?;
//! println!("{}", path.display());
//! # Ok(())
//! # }
//! ```

use crate::catalog::{
    find_resource, find_version, resource_for_file, Catalog, CatalogClient, CatalogSource,
    ModelRef, Resource, VersionRef,
};
use crate::config::{CacheConfig, OfflineSwitch};
use crate::error::{CacheError, Result};
use crate::naming::compile_pattern;
use crate::store::{DispatchManager, SyncContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to fetch: a model, optionally narrowed to a version, a file pattern
/// and a creator.
///
/// Without a version the most recent one is used; without a pattern the
/// version's primary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub model: ModelRef,
    pub version: Option<VersionRef>,
    pub pattern: Option<String>,
    pub creator: Option<String>,
}

impl FileRequest {
    pub fn new(model: impl Into<ModelRef>) -> Self {
        Self {
            model: model.into(),
            version: None,
            pattern: None,
            creator: None,
        }
    }

    pub fn version(mut self, version: impl Into<VersionRef>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    /// Reject empty identifiers and malformed patterns before any I/O.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        if let Some(version) = &self.version {
            version.validate()?;
        }
        if let Some(pattern) = &self.pattern {
            compile_pattern(pattern)?;
        }
        if let Some(creator) = &self.creator {
            if creator.trim().is_empty() {
                return Err(CacheError::invalid_argument(
                    "creator",
                    "creator must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// Model cache: catalog resolution plus the local store.
pub struct ModelCache {
    config: CacheConfig,
    catalog: Catalog,
    dispatch: DispatchManager,
}

impl ModelCache {
    /// Cache backed by the Civitai HTTP API at `config.endpoint`.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let client = CatalogClient::new(&config)?;
        debug!("Catalog endpoint {}", client.endpoint());
        Self::with_source(config, Arc::new(client))
    }

    /// Cache backed by any catalog source.
    pub fn with_source(config: CacheConfig, source: Arc<dyn CatalogSource>) -> Result<Self> {
        let catalog = Catalog::new(source);
        let ctx = SyncContext::new(catalog.clone(), &config);
        let dispatch = DispatchManager::new(&config.root_dir, ctx)?;
        debug!("Model cache rooted at {}", config.root_dir.display());
        Ok(Self {
            config,
            catalog,
            dispatch,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn dispatch(&self) -> &DispatchManager {
        &self.dispatch
    }

    /// The shared switch this cache consults before every network call.
    pub fn offline_switch(&self) -> &OfflineSwitch {
        &self.config.offline_switch
    }

    /// Local path of the requested file, downloading it first when the
    /// catalog is reachable and the cached copy is missing or stale.
    pub async fn get_file(&self, request: &FileRequest) -> Result<PathBuf> {
        self.dispatch.get_file(request).await
    }

    /// Resolve a request against the catalog without touching the cache.
    ///
    /// A model identifier that looks like a file digest is tried against the
    /// hash lookup first; a hit wins outright and any version or pattern in
    /// the request is ignored.
    pub async fn find_online(&self, request: &FileRequest) -> Result<Resource> {
        request.validate()?;
        if self.config.is_offline() {
            return Err(CacheError::OfflineMode);
        }

        if let ModelRef::Name(identifier) = &request.model {
            if let Some(hit) = self.catalog.find_version_id_by_hash(identifier).await? {
                if request.version.is_some() || request.pattern.is_some() {
                    warn!(
                        "{} matched a file hash; ignoring version {:?} and pattern {:?}",
                        identifier, request.version, request.pattern
                    );
                }
                return resource_for_file(&hit.model, &hit.version, &hit.file);
            }
        }

        let model = self
            .catalog
            .find_model(&request.model, request.creator.as_deref())
            .await?;
        let version = find_version(&model, request.version.as_ref())?;
        find_resource(&model, version, request.pattern.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = FileRequest::new(6755_i64).version("V4").pattern("*.vae.pt");
        assert_eq!(request.model, ModelRef::Id(6755));
        assert_eq!(request.version, Some(VersionRef::Name("V4".into())));
        assert_eq!(request.pattern.as_deref(), Some("*.vae.pt"));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        assert!(FileRequest::new("").validate().is_err());
        assert!(FileRequest::new("amiya").pattern("").validate().is_err());
        assert!(FileRequest::new("amiya").version("").validate().is_err());
        assert!(FileRequest::new("amiya").creator(" ").validate().is_err());
    }
}
