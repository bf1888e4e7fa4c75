//! Streaming SHA-256 for downloaded model files.
//!
//! Digests are rendered as uppercase hex, which is how the catalog reports
//! them and how hash records are stored on disk.

use crate::error::{CacheError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Chunk size for reading files (8MB).
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Compute the SHA-256 of a file as uppercase hex.
pub fn compute_sha256(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| CacheError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| CacheError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode_upper(hasher.finalize()))
}

/// Verify a file's SHA-256 against `expected` (any case).
///
/// Runs on the blocking pool; model files are routinely several gigabytes.
pub async fn verify_sha256(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let path = path.as_ref().to_path_buf();
    let expected = expected.to_uppercase();

    let actual = tokio::task::spawn_blocking({
        let path = path.clone();
        move || compute_sha256(&path)
    })
    .await
    .map_err(|e| CacheError::Other(format!("Hash computation task failed: {}", e)))??;

    if actual == expected {
        Ok(())
    } else {
        Err(CacheError::HashMismatch {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            expected,
            actual,
        })
    }
}
