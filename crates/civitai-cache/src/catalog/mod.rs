//! Remote catalog access and resolution.
//!
//! # Module Organization
//!
//! - [`types`] - Catalog records, [`Resource`], and request identifiers
//! - [`resolve`] - Model / version / file disambiguation
//! - [`client`] - reqwest-backed [`CatalogSource`] with streaming downloads
//!
//! The resolver never talks HTTP directly; it goes through [`CatalogSource`],
//! which is also the seam tests use to serve a fixture catalog.

mod client;
mod resolve;
mod types;

pub use client::CatalogClient;
pub use resolve::{find_resource, find_version, looks_like_hash, resource_for_file, Catalog};
pub use types::{
    CreatorRecord, FileHashes, FileRecord, HashMatch, ModelRecord, ModelRef, Resource,
    SearchResponse, VersionRecord, VersionRef,
};

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Raw access to the remote catalog.
///
/// Implementations report "does not exist" as `Ok(None)` and classify
/// transport failures into the connectivity / security / other variants of
/// [`CacheError`](crate::CacheError).
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch a model by id; `None` when the catalog answers 404.
    async fn model_by_id(&self, id: i64) -> Result<Option<ModelRecord>>;

    /// Free-text model search. Filtering is left to the caller.
    async fn search_models(&self, query: &str) -> Result<Vec<ModelRecord>>;

    /// Look up a version by any of its files' digests; `None` on 404.
    async fn version_by_hash(&self, hash: &str) -> Result<Option<VersionRecord>>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}
