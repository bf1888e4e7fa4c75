//! Online / local decision shared by every cache tier.
//!
//! A tier first tries the remote path. It drops to the local cache when the
//! instance or the shared switch says offline, or when the remote path fails
//! with a connectivity-class error. Everything else propagates.

use crate::catalog::Catalog;
use crate::config::{CacheConfig, OfflineSwitch};
use crate::error::Result;
use std::future::Future;
use tracing::{debug, warn};

/// Resolution state of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Online,
    Local,
}

/// Catalog access plus the flags deciding whether to use it.
#[derive(Clone)]
pub struct SyncContext {
    catalog: Catalog,
    offline: bool,
    offline_switch: OfflineSwitch,
    verify_hash: bool,
}

impl SyncContext {
    pub fn new(catalog: Catalog, config: &CacheConfig) -> Self {
        Self {
            catalog,
            offline: config.offline,
            offline_switch: config.offline_switch.clone(),
            verify_hash: config.verify_hash,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn verify_hash(&self) -> bool {
        self.verify_hash
    }

    /// Current mode, re-read on every call so switch flips apply immediately.
    pub fn mode(&self) -> SyncMode {
        if self.offline || self.offline_switch.is_enabled() {
            SyncMode::Local
        } else {
            SyncMode::Online
        }
    }

    /// Run `remote` in online mode.
    ///
    /// `Ok(None)` means "use the local cache": the context is offline, or the
    /// remote step hit a connectivity failure. `remote` is not polled at all
    /// in local mode.
    pub async fn try_online<T, F>(&self, what: &str, remote: F) -> Result<Option<T>>
    where
        F: Future<Output = Result<T>>,
    {
        if self.mode() == SyncMode::Local {
            debug!("Offline mode, resolving {} from the local cache", what);
            return Ok(None);
        }

        match remote.await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_connectivity() => {
                warn!(
                    "Catalog unreachable while resolving {} ({}), using the local cache",
                    what, e
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("mode", &self.mode())
            .field("verify_hash", &self.verify_hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSource, ModelRecord, VersionRecord};
    use crate::error::CacheError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    struct NullSource;

    #[async_trait]
    impl CatalogSource for NullSource {
        async fn model_by_id(&self, _id: i64) -> Result<Option<ModelRecord>> {
            Ok(None)
        }
        async fn search_models(&self, _query: &str) -> Result<Vec<ModelRecord>> {
            Ok(Vec::new())
        }
        async fn version_by_hash(&self, _hash: &str) -> Result<Option<VersionRecord>> {
            Ok(None)
        }
        async fn download(&self, _url: &str, _dest: &Path) -> Result<u64> {
            Ok(0)
        }
    }

    fn context(config: &CacheConfig) -> SyncContext {
        SyncContext::new(Catalog::new(Arc::new(NullSource)), config)
    }

    #[tokio::test]
    async fn test_connectivity_errors_fall_back() {
        let ctx = context(&CacheConfig::new("/tmp/civitai"));

        let timeout: Result<()> = Err(CacheError::Timeout(Duration::from_secs(1)));
        assert_eq!(ctx.try_online("model", async { timeout }).await.unwrap(), None);

        let ok = ctx.try_online("model", async { Ok(7) }).await.unwrap();
        assert_eq!(ok, Some(7));
    }

    #[tokio::test]
    async fn test_security_errors_propagate() {
        let ctx = context(&CacheConfig::new("/tmp/civitai"));
        let tls: Result<()> = Err(CacheError::Tls {
            message: "bad certificate".into(),
        });
        assert!(matches!(
            ctx.try_online("model", async { tls }).await,
            Err(CacheError::Tls { .. })
        ));
    }

    #[tokio::test]
    async fn test_switch_is_read_per_call() {
        let switch = OfflineSwitch::default();
        let config = CacheConfig::new("/tmp/civitai").with_offline_switch(switch.clone());
        let ctx = context(&config);
        assert_eq!(ctx.mode(), SyncMode::Online);

        switch.set(true);
        assert_eq!(ctx.mode(), SyncMode::Local);
        let skipped = ctx
            .try_online("model", async { Ok::<_, CacheError>(1) })
            .await
            .unwrap();
        assert_eq!(skipped, None);
    }
}
