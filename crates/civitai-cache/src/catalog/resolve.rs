//! Disambiguation of catalog lookups down to one model, version and file.

use super::types::{
    FileRecord, HashMatch, ModelRecord, ModelRef, Resource, VersionRecord, VersionRef,
};
use super::CatalogSource;
use crate::config::CatalogConfig;
use crate::error::{CacheError, Result};
use crate::naming::{compile_pattern, names_match, strip_name};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Pattern label used in errors when the primary file was requested.
const PRIMARY_LABEL: &str = "<primary>";

/// Tolerance when converting the catalog's fractional KB size to bytes.
const SIZE_TOLERANCE: f64 = 1e-4;

/// Resolver over a [`CatalogSource`].
#[derive(Clone)]
pub struct Catalog {
    source: Arc<dyn CatalogSource>,
}

impl Catalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// Fetch a model by id. A 404 becomes [`CacheError::ModelNotFound`].
    pub async fn find_model_by_id(&self, id: i64) -> Result<ModelRecord> {
        debug!("Looking up model by id {}", id);
        self.source
            .model_by_id(id)
            .await?
            .ok_or_else(|| CacheError::ModelNotFound {
                model: id.to_string(),
            })
    }

    /// Search by name and keep the single result whose normalized name (and
    /// creator, when given) matches.
    pub async fn find_model_by_name(
        &self,
        name: &str,
        creator: Option<&str>,
    ) -> Result<ModelRecord> {
        debug!("Searching catalog for model {:?} (creator {:?})", name, creator);
        let items = self.source.search_models(name).await?;

        let mut matched: Vec<ModelRecord> = Vec::new();
        for item in items {
            if !names_match(&item.name, name) {
                continue;
            }
            if let Some(creator) = creator {
                let creator_ok = item
                    .creator_name()
                    .is_some_and(|c| names_match(c, creator));
                if !creator_ok {
                    continue;
                }
            }
            // Search pages can repeat an item.
            if matched.iter().any(|m| m.id == item.id) {
                continue;
            }
            matched.push(item);
        }

        match matched.len() {
            0 => Err(CacheError::ModelNotFound {
                model: name.to_string(),
            }),
            1 => Ok(matched.remove(0)),
            _ => Err(CacheError::ModelDuplicated {
                model: name.to_string(),
                candidates: matched.into_iter().map(|m| m.name).collect(),
            }),
        }
    }

    /// Resolve a model identifier.
    ///
    /// A numeric-looking name is tried as an id first (only without a creator
    /// filter) and falls back to the name search when that id does not exist.
    /// Transport errors from the id lookup are not masked.
    pub async fn find_model(
        &self,
        model: &ModelRef,
        creator: Option<&str>,
    ) -> Result<ModelRecord> {
        model.validate()?;
        match model {
            ModelRef::Id(id) => self.find_model_by_id(*id).await,
            ModelRef::Name(name) => {
                if creator.is_none() {
                    if let Some(id) = model.as_id() {
                        match self.find_model_by_id(id).await {
                            Ok(record) => return Ok(record),
                            Err(CacheError::ModelNotFound { .. }) => {
                                debug!("No model with id {}, searching by name", id);
                            }
                            Err(e) => return Err(e),
                        }
                    }
                }
                self.find_model_by_name(name, creator).await
            }
        }
    }

    /// Resolve a content digest straight to (model, version, file).
    ///
    /// `Ok(None)` when the identifier is not hash-shaped, the catalog does not
    /// know it, or no file of the returned version carries a matching digest.
    pub async fn find_version_id_by_hash(&self, identifier: &str) -> Result<Option<HashMatch>> {
        let identifier = identifier.trim();
        if !looks_like_hash(identifier) {
            return Ok(None);
        }

        debug!("Probing catalog for hash {}", identifier);
        let Some(version) = self.source.version_by_hash(identifier).await? else {
            return Ok(None);
        };
        let Some(file) = version
            .files
            .iter()
            .find(|f| f.hashes.matches_prefix(identifier))
            .cloned()
        else {
            debug!(
                "Version {} returned for {} has no file with that digest",
                version.id, identifier
            );
            return Ok(None);
        };
        let Some(model_id) = version.model_id else {
            return Ok(None);
        };

        let model = match self.source.model_by_id(model_id).await? {
            Some(model) => model,
            None => return Ok(None),
        };
        // Prefer the version as listed in the model record when present.
        let version = model
            .model_versions
            .iter()
            .find(|v| v.id == version.id)
            .cloned()
            .unwrap_or(version);

        Ok(Some(HashMatch {
            model,
            version,
            file,
        }))
    }

    /// Stream a resolved file into `dest`.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.source.download(url, dest).await
    }
}

/// Whether `identifier` could be a (partial) hex digest.
pub fn looks_like_hash(identifier: &str) -> bool {
    (CatalogConfig::HASH_PROBE_MIN_LEN..=CatalogConfig::HASH_PROBE_MAX_LEN)
        .contains(&identifier.len())
        && identifier.chars().all(|c| c.is_ascii_hexdigit())
}

/// Pick a version of `model`: the most recent one when `version` is `None`,
/// otherwise the single version matching by id or normalized name.
pub fn find_version<'a>(
    model: &'a ModelRecord,
    version: Option<&VersionRef>,
) -> Result<&'a VersionRecord> {
    let Some(wanted) = version else {
        return model
            .model_versions
            .first()
            .ok_or_else(|| CacheError::VersionNotFound {
                model: model.name.clone(),
                version: "<latest>".to_string(),
            });
    };
    wanted.validate()?;

    let key = strip_name(&wanted.as_text());
    let matched: Vec<&VersionRecord> = model
        .model_versions
        .iter()
        .filter(|v| wanted.as_id() == Some(v.id) || strip_name(&v.name) == key)
        .collect();

    match matched.as_slice() {
        [] => Err(CacheError::VersionNotFound {
            model: model.name.clone(),
            version: wanted.as_text(),
        }),
        [only] => Ok(*only),
        _ => Err(CacheError::VersionDuplicated {
            model: model.name.clone(),
            version: wanted.as_text(),
            candidates: matched.iter().map(|v| v.name.clone()).collect(),
        }),
    }
}

/// Pick one file of `version`: the primary when `pattern` is `None`, otherwise
/// the single file whose name matches the glob.
pub fn find_resource(
    model: &ModelRecord,
    version: &VersionRecord,
    pattern: Option<&str>,
) -> Result<Resource> {
    let matched: Vec<_> = match pattern {
        None => version.files.iter().filter(|f| f.is_primary()).collect(),
        Some(pattern) => {
            let matcher = compile_pattern(pattern)?;
            version
                .files
                .iter()
                .filter(|f| matcher.is_match(&f.name))
                .collect()
        }
    };
    let label = pattern.unwrap_or(PRIMARY_LABEL);

    let file = match matched.as_slice() {
        [] => {
            return Err(CacheError::ResourceNotFound {
                model: model.name.clone(),
                version: version.name.clone(),
                pattern: label.to_string(),
            })
        }
        [only] => *only,
        _ => {
            return Err(CacheError::ResourceDuplicated {
                model: model.name.clone(),
                version: version.name.clone(),
                pattern: label.to_string(),
                candidates: matched.iter().map(|f| f.name.clone()).collect(),
            })
        }
    };

    resource_for_file(model, version, file)
}

/// Describe one specific file of `version` as a [`Resource`].
///
/// Fails with [`CacheError::Integrity`] when the declared size is not a
/// whole number of bytes.
pub fn resource_for_file(
    model: &ModelRecord,
    version: &VersionRecord,
    file: &FileRecord,
) -> Result<Resource> {
    let size = size_in_bytes(&file.name, file.size_kb)?;
    Ok(Resource {
        model_name: model.name.clone(),
        model_id: model.id,
        version_name: version.name.clone(),
        version_id: version.id,
        filename: file.name.clone(),
        is_primary: file.is_primary(),
        url: file.download_url.clone(),
        // A missing digest never equals a local hash record, so the file is
        // always re-fetched and verification is skipped.
        sha256: file.hashes.sha256().unwrap_or_default().to_uppercase(),
        crc32: file.hashes.crc32().map(str::to_string),
        size,
    })
}

fn size_in_bytes(filename: &str, size_kb: f64) -> Result<u64> {
    let bytes = size_kb * 1024.0;
    let rounded = bytes.round();
    if !bytes.is_finite() || bytes < 0.0 || (rounded - bytes).abs() >= SIZE_TOLERANCE {
        return Err(CacheError::Integrity {
            filename: filename.to_string(),
            size_kb,
        });
    }
    Ok(rounded as u64)
}
