//! Small text records (hash files, the primary marker) written atomically.
//!
//! Writes go to a temp file in the same directory, are synced, then renamed
//! over the target so a crash never leaves a half-written record.

use crate::error::{CacheError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process;
use tracing::debug;

/// Read the first line of a text record, trimmed.
///
/// Returns `None` when the file is missing or the line is empty.
pub fn read_first_line(path: &Path) -> Result<Option<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io_with_path(e, path)),
    };

    let line = contents.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(line.to_string()))
    }
}

/// Replace `path` with a single line of text.
pub fn write_line_atomic(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CacheError::io_with_path(e, parent))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, process::id()));

    {
        let mut file =
            fs::File::create(&temp_path).map_err(|e| CacheError::io_with_path(e, &temp_path))?;
        writeln!(file, "{}", line).map_err(|e| CacheError::io_with_path(e, &temp_path))?;
        file.sync_all()
            .map_err(|e| CacheError::io_with_path(e, &temp_path))?;
    }

    fs::rename(&temp_path, path).map_err(|e| CacheError::Io {
        message: format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        ),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io_with_path(e, path)),
    }
}
