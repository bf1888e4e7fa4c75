//! Local cache store: a three-tier directory hierarchy.
//!
//! ```text
//! <root>/
//! ├── .filelock
//! └── <norm-model>__<model-id>/
//!     ├── .filelock
//!     └── <norm-version>__<version-id>/
//!         ├── .filelock
//!         ├── primary
//!         ├── files/<filename>
//!         └── hashes/<filename>.hash
//! ```
//!
//! # Module Organization
//!
//! - [`dispatch`] - Root tier, one folder per model
//! - [`model`] - Model tier, one folder per version
//! - [`version`] - Version tier, cached files plus hash records
//! - [`sync`] - Online / local decision shared by all tiers
//! - [`lock`] - Per-directory advisory locks
//! - [`atomic`] - Atomic text records
//! - [`tree`] - Diagnostic rendering

mod atomic;
mod dispatch;
mod lock;
mod model;
mod sync;
mod tree;
mod version;

pub use dispatch::DispatchManager;
pub use lock::DirLock;
pub use model::ModelManager;
pub use sync::{SyncContext, SyncMode};
pub use tree::TreeNode;
pub use version::{LocalFile, VersionManager};

use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use crate::naming::soft_strip_name;
use std::path::{Path, PathBuf};

/// A cached model or version folder, parsed from `<name>__<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDir {
    /// Normalized name as stored on disk.
    pub name: String,
    pub id: i64,
    pub path: PathBuf,
}

impl EntryDir {
    pub fn dir_name(&self) -> String {
        format!("{}{}{}", self.name, StoreConfig::ID_SEPARATOR, self.id)
    }
}

/// Folder name for a model or version.
pub fn entry_dir_name(name: &str, id: i64) -> String {
    format!("{}{}{}", soft_strip_name(name), StoreConfig::ID_SEPARATOR, id)
}

/// Split a folder name into (normalized name, id).
///
/// Normalized names never contain the separator, so anything that does not
/// split into exactly two parts with a numeric tail is not ours.
pub fn parse_entry_dir_name(dir_name: &str) -> Option<(String, i64)> {
    let mut parts = dir_name.split(StoreConfig::ID_SEPARATOR);
    let name = parts.next()?;
    let id = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((name.to_string(), id))
}

/// List the `<name>__<id>` subdirectories of `dir`, sorted by id.
///
/// A missing directory lists as empty.
pub(crate) fn list_entry_dirs(dir: &Path) -> Result<Vec<EntryDir>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CacheError::io_with_path(e, dir)),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| CacheError::io_with_path(e, dir))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let Some((name, id)) = parse_entry_dir_name(&file_name.to_string_lossy()) else {
            continue;
        };
        entries.push(EntryDir { name, id, path });
    }

    entries.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Remove a directory tree, treating "already gone" as success.
pub(crate) fn remove_tree(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io_with_path(e, dir)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_dir_name() {
        assert_eq!(entry_dir_name("Cetus-Mix", 6755), "cetus_mix__6755");
        assert_eq!(
            entry_dir_name("amiya arknights (old)", 115427),
            "amiya_arknights_old__115427"
        );
    }

    #[test]
    fn test_parse_entry_dir_name() {
        assert_eq!(
            parse_entry_dir_name("cetus_mix__6755"),
            Some(("cetus_mix".to_string(), 6755))
        );
        assert_eq!(parse_entry_dir_name("__12"), Some((String::new(), 12)));
        assert_eq!(parse_entry_dir_name("cetus_mix"), None);
        assert_eq!(parse_entry_dir_name("a__b__1"), None);
        assert_eq!(parse_entry_dir_name("v4__abc"), None);
    }

    #[test]
    fn test_list_entry_dirs_skips_foreign_entries() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir(root.join("v4__78676")).unwrap();
        std::fs::create_dir(root.join("v3_5__45214")).unwrap();
        std::fs::create_dir(root.join("not-an-entry")).unwrap();
        std::fs::write(root.join("file__1"), "x").unwrap();
        std::fs::write(root.join(".filelock"), "").unwrap();

        let entries = list_entry_dirs(root).unwrap();
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![45214, 78676]);
        assert_eq!(entries[0].dir_name(), "v3_5__45214");
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_entry_dirs(&temp_dir.path().join("missing"))
            .unwrap()
            .is_empty());
    }
}
