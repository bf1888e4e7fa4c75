//! Centralized configuration for the model cache.
//!
//! Constant holders for the catalog endpoint and the on-disk layout, plus the
//! runtime [`CacheConfig`] that callers construct and inject.

use crate::error::{CacheError, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Remote catalog configuration.
pub struct CatalogConfig;

impl CatalogConfig {
    pub const DEFAULT_ENDPOINT: &'static str = "https://civitai.com";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = "civitai-cache/0.1";
    /// Shortest identifier treated as a (partial) hex digest by the hash probe.
    pub const HASH_PROBE_MIN_LEN: usize = 8;
    /// Longest identifier treated as a hex digest (full SHA-256).
    pub const HASH_PROBE_MAX_LEN: usize = 64;
}

/// On-disk layout of the cache.
pub struct StoreConfig;

impl StoreConfig {
    pub const LOCK_FILE_NAME: &'static str = ".filelock";
    pub const FILES_DIR_NAME: &'static str = "files";
    pub const HASHES_DIR_NAME: &'static str = "hashes";
    pub const HASH_SUFFIX: &'static str = ".hash";
    pub const PRIMARY_FILE_NAME: &'static str = "primary";
    pub const STAGING_PREFIX: &'static str = ".staging-";
    /// Separator between the normalized name and the id in folder names.
    pub const ID_SEPARATOR: &'static str = "__";
    /// Default cache root, relative to the user's home directory.
    pub const DEFAULT_HOME: &'static str = ".cache/civitai";
}

/// Environment variables read by [`CacheConfig::from_env`].
pub struct EnvConfig;

impl EnvConfig {
    pub const HOME: &'static str = "CIVITAI_HOME";
    pub const ENDPOINT: &'static str = "CIVITAI_ENDPOINT";
    pub const OFFLINE: &'static str = "CIVITAI_OFFLINE";
    pub const API_TOKEN: &'static str = "CIVITAI_API_TOKEN";
}

/// Shared offline flag.
///
/// Clones share the same flag, so an embedding application can keep one
/// handle and flip it while caches built from the same config are in use.
#[derive(Debug, Clone, Default)]
pub struct OfflineSwitch(Arc<AtomicBool>);

impl OfflineSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

/// Runtime configuration for a cache instance.
#[derive(Clone)]
pub struct CacheConfig {
    /// Root directory of the cache hierarchy.
    pub root_dir: PathBuf,
    /// Catalog base URL (no trailing slash).
    pub endpoint: String,
    /// Per-instance offline flag; never touches the network when set.
    pub offline: bool,
    /// Process-wide offline switch shared with the embedding application.
    pub offline_switch: OfflineSwitch,
    /// Total timeout for catalog API requests.
    pub request_timeout: Duration,
    /// Connect timeout for file downloads (downloads have no total timeout).
    pub connect_timeout: Duration,
    /// Check the SHA-256 of downloaded bytes against the catalog's hash.
    pub verify_hash: bool,
    /// Optional bearer token for the catalog API.
    pub api_token: Option<String>,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("root_dir", &self.root_dir)
            .field("endpoint", &self.endpoint)
            .field("offline", &self.offline)
            .field("offline_switch", &self.offline_switch.is_enabled())
            .field("verify_hash", &self.verify_hash)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CacheConfig {
    /// Create a configuration rooted at `root_dir` with default settings.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            endpoint: CatalogConfig::DEFAULT_ENDPOINT.to_string(),
            offline: false,
            offline_switch: OfflineSwitch::default(),
            request_timeout: CatalogConfig::REQUEST_TIMEOUT,
            connect_timeout: CatalogConfig::CONNECT_TIMEOUT,
            verify_hash: true,
            api_token: None,
        }
    }

    /// Build a configuration from `CIVITAI_*` environment variables.
    ///
    /// The root defaults to `~/.cache/civitai` when `CIVITAI_HOME` is unset.
    pub fn from_env() -> Result<Self> {
        let root_dir = match std::env::var_os(EnvConfig::HOME) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| CacheError::Config {
                    message: format!(
                        "Cannot determine home directory; set {}",
                        EnvConfig::HOME
                    ),
                })?
                .join(StoreConfig::DEFAULT_HOME),
        };

        let mut config = Self::new(root_dir);
        if let Ok(endpoint) = std::env::var(EnvConfig::ENDPOINT) {
            config = config.with_endpoint(endpoint)?;
        }
        if let Ok(value) = std::env::var(EnvConfig::OFFLINE) {
            config.offline_switch.set(parse_flag(&value));
        }
        if let Ok(token) = std::env::var(EnvConfig::API_TOKEN) {
            if !token.trim().is_empty() {
                config.api_token = Some(token.trim().to_string());
            }
        }
        Ok(config)
    }

    /// Override the catalog endpoint. The URL must be absolute http(s).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        let parsed = url::Url::parse(&endpoint).map_err(|e| CacheError::Config {
            message: format!("Invalid catalog endpoint {:?}: {}", endpoint, e),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CacheError::Config {
                message: format!("Catalog endpoint must be http(s): {}", endpoint),
            });
        }
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Share an existing offline switch instead of the config's own.
    pub fn with_offline_switch(mut self, switch: OfflineSwitch) -> Self {
        self.offline_switch = switch;
        self
    }

    pub fn with_verify_hash(mut self, verify: bool) -> Self {
        self.verify_hash = verify;
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Whether resolution must stay local, from either flag.
    pub fn is_offline(&self) -> bool {
        self.offline || self.offline_switch.is_enabled()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::new("/tmp/civitai");
        assert_eq!(config.endpoint, CatalogConfig::DEFAULT_ENDPOINT);
        assert!(config.verify_hash);
        assert!(!config.is_offline());
    }

    #[test]
    fn test_offline_switch_is_shared() {
        let switch = OfflineSwitch::default();
        let config = CacheConfig::new("/tmp/civitai").with_offline_switch(switch.clone());
        let cloned = config.clone();

        switch.set(true);
        assert!(config.is_offline());
        assert!(cloned.is_offline());

        switch.set(false);
        assert!(!cloned.is_offline());
    }

    #[test]
    fn test_endpoint_validation() {
        let config = CacheConfig::new("/tmp/civitai")
            .with_endpoint("http://localhost:8080/")
            .unwrap();
        assert_eq!(config.endpoint, "http://localhost:8080");

        assert!(CacheConfig::new("/tmp/civitai")
            .with_endpoint("not a url")
            .is_err());
        assert!(CacheConfig::new("/tmp/civitai")
            .with_endpoint("ftp://example.com")
            .is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = CacheConfig::new("/tmp/civitai").with_api_token("secret-token");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
