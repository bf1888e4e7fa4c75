//! civitai-cache - local cache over the Civitai model catalog.
//!
//! Resolves a model / version / file designator against the catalog,
//! downloads and verifies the file into a local content store, and serves
//! later requests from that store, without the network when it is
//! unreachable or the cache is switched offline.
//!
//! # Example
//!
//! ```rust,ignore
//! use civitai_cache::{CacheConfig, FileRequest, ModelCache};
//!
//! #[tokio::main]
//! async fn main() -> civitai_cache::Result<()> {
//!     let cache = ModelCache::new(CacheConfig::from_env()?)?;
//!
//!     // Primary file of the latest version
//!     let path = cache.get_file(&FileRequest::new("amiya arknights")).await?;
//!     println!("{}", path.display());
//!
//!     // Same lookup without the cache
//!     let resource = cache.find_online(&FileRequest::new(115427_i64)).await?;
//!     println!("{} ({} bytes)", resource.filename, resource.size);
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod hashing;
pub mod naming;
pub mod store;

mod api;

pub use api::{FileRequest, ModelCache};
pub use catalog::{Catalog, CatalogClient, CatalogSource, ModelRef, Resource, VersionRef};
pub use config::{CacheConfig, OfflineSwitch};
pub use error::{CacheError, Result};
pub use store::{DispatchManager, LocalFile, ModelManager, TreeNode, VersionManager};
