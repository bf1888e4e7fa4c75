//! Catalog record types and request identifiers.
//!
//! The record structs mirror the JSON returned by the catalog API; only the
//! fields the cache depends on are modeled, everything else is ignored.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Model record (`GET /api/v1/models/{id}` and search items).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub creator: Option<CreatorRecord>,
    /// Versions, most recent first.
    #[serde(default)]
    pub model_versions: Vec<VersionRecord>,
}

impl ModelRecord {
    pub fn creator_name(&self) -> Option<&str> {
        self.creator.as_ref().and_then(|c| c.username.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorRecord {
    #[serde(default)]
    pub username: Option<String>,
}

/// Model version record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub id: i64,
    pub name: String,
    /// Present on the by-hash endpoint, absent inside a model record.
    #[serde(default)]
    pub model_id: Option<i64>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

/// File record inside a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    #[serde(rename = "sizeKB")]
    pub size_kb: f64,
    #[serde(default)]
    pub hashes: FileHashes,
    #[serde(default)]
    pub primary: Option<bool>,
}

impl FileRecord {
    pub fn is_primary(&self) -> bool {
        self.primary.unwrap_or(false)
    }
}

/// Digest table keyed by algorithm name (`SHA256`, `CRC32`, `AutoV2`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHashes(pub BTreeMap<String, String>);

impl FileHashes {
    pub fn sha256(&self) -> Option<&str> {
        self.0.get("SHA256").map(String::as_str)
    }

    pub fn crc32(&self) -> Option<&str> {
        self.0.get("CRC32").map(String::as_str)
    }

    /// Whether any digest starts with `probe` (case-insensitive).
    pub fn matches_prefix(&self, probe: &str) -> bool {
        let probe = probe.to_uppercase();
        self.0
            .values()
            .any(|digest| digest.to_uppercase().starts_with(&probe))
    }
}

/// Search response (`GET /api/v1/models?query=...`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<ModelRecord>,
}

/// A resolved remote file: everything needed to download and verify it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub model_name: String,
    pub model_id: i64,
    pub version_name: String,
    pub version_id: i64,
    pub filename: String,
    pub is_primary: bool,
    pub url: String,
    /// Uppercase hex digest.
    pub sha256: String,
    pub crc32: Option<String>,
    /// Size in bytes.
    pub size: u64,
}

/// A (model, version, file) triple found through the hash lookup.
#[derive(Debug, Clone)]
pub struct HashMatch {
    pub model: ModelRecord,
    pub version: VersionRecord,
    pub file: FileRecord,
}

/// How a caller names a model: catalog id or free-text name.
///
/// A name that happens to be all digits is tried as an id first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelRef {
    Id(i64),
    Name(String),
}

impl ModelRef {
    /// Reject identifiers that can never resolve, before any network call.
    pub fn validate(&self) -> Result<()> {
        match self {
            ModelRef::Name(name) if name.trim().is_empty() => Err(CacheError::invalid_argument(
                "model",
                "model name must not be empty",
            )),
            _ => Ok(()),
        }
    }

    /// The identifier as plain text, for matching against folder names.
    pub fn as_text(&self) -> String {
        match self {
            ModelRef::Id(id) => id.to_string(),
            ModelRef::Name(name) => name.clone(),
        }
    }

    /// Numeric form: the id itself, or a name that parses as one.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            ModelRef::Id(id) => Some(*id),
            ModelRef::Name(name) => name.trim().parse().ok(),
        }
    }
}

impl From<i64> for ModelRef {
    fn from(id: i64) -> Self {
        ModelRef::Id(id)
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        ModelRef::Name(name.to_string())
    }
}

impl From<String> for ModelRef {
    fn from(name: String) -> Self {
        ModelRef::Name(name)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Id(id) => write!(f, "{}", id),
            ModelRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// How a caller names a version: catalog id or free-text name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionRef {
    Id(i64),
    Name(String),
}

impl VersionRef {
    /// Parse command-line input: all digits is an id, anything else a name.
    ///
    /// Id matching also compares against version names, so a version literally
    /// named "4" is still found.
    pub fn parse(input: &str) -> Self {
        match input.trim().parse::<i64>() {
            Ok(id) => VersionRef::Id(id),
            Err(_) => VersionRef::Name(input.to_string()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            VersionRef::Name(name) if name.trim().is_empty() => Err(
                CacheError::invalid_argument("version", "version name must not be empty"),
            ),
            _ => Ok(()),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            VersionRef::Id(id) => id.to_string(),
            VersionRef::Name(name) => name.clone(),
        }
    }

    pub fn as_id(&self) -> Option<i64> {
        match self {
            VersionRef::Id(id) => Some(*id),
            VersionRef::Name(_) => None,
        }
    }
}

impl From<i64> for VersionRef {
    fn from(id: i64) -> Self {
        VersionRef::Id(id)
    }
}

impl From<&str> for VersionRef {
    fn from(name: &str) -> Self {
        VersionRef::Name(name.to_string())
    }
}

impl From<String> for VersionRef {
    fn from(name: String) -> Self {
        VersionRef::Name(name)
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRef::Id(id) => write!(f, "{}", id),
            VersionRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}
