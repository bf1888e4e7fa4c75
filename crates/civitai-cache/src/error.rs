//! Error types for the model cache.
//!
//! Every lookup failure is a distinct variant carrying the identifiers (and,
//! for ambiguous lookups, the candidate list) needed to correct the request.
//! Transport failures are classified so the sync engine can decide between
//! falling back to the local cache and propagating.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the model cache.
#[derive(Debug, Error)]
pub enum CacheError {
    // Remote catalog lookups
    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Model {model} matches multiple catalog entries: {candidates:?}")]
    ModelDuplicated {
        model: String,
        candidates: Vec<String>,
    },

    #[error("Version {version} not found for model {model}")]
    VersionNotFound { model: String, version: String },

    #[error("Version {version} of model {model} is ambiguous: {candidates:?}")]
    VersionDuplicated {
        model: String,
        version: String,
        candidates: Vec<String>,
    },

    #[error("No file matching {pattern} in {model} / {version}")]
    ResourceNotFound {
        model: String,
        version: String,
        pattern: String,
    },

    #[error("Multiple files match {pattern} in {model} / {version}: {candidates:?}")]
    ResourceDuplicated {
        model: String,
        version: String,
        pattern: String,
        candidates: Vec<String>,
    },

    // Local cache lookups
    #[error("Model {model} is not cached locally")]
    LocalModelNotFound { model: String },

    #[error("Model {model} matches multiple cached folders: {candidates:?}")]
    LocalModelDuplicated {
        model: String,
        candidates: Vec<String>,
    },

    #[error("Version {version} of model {model} is not cached locally")]
    LocalVersionNotFound { model: String, version: String },

    #[error("Version {version} of model {model} matches multiple cached folders: {candidates:?}")]
    LocalVersionDuplicated {
        model: String,
        version: String,
        candidates: Vec<String>,
    },

    #[error("No cached file matching {pattern} in {model} / {version}")]
    LocalFileNotFound {
        model: String,
        version: String,
        pattern: String,
    },

    #[error("Multiple cached files match {pattern} in {model} / {version}: {candidates:?}")]
    LocalFileDuplicated {
        model: String,
        version: String,
        pattern: String,
        candidates: Vec<String>,
    },

    #[error("No primary file recorded for {model} / {version}")]
    PrimaryFileUnset { model: String, version: String },

    // Integrity
    #[error("Size of {filename} does not reconcile: {size_kb} KB is not a whole number of bytes")]
    Integrity { filename: String, size_kb: f64 },

    #[error("Downloaded {filename} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        filename: String,
        expected: u64,
        actual: u64,
    },

    #[error("Hash mismatch for {filename}: expected {expected}, got {actual}")]
    HashMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    // Transport, connectivity class
    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Offline mode is enabled")]
    OfflineMode,

    // Transport, security class
    #[error("TLS error: {message}")]
    Tls { message: String },

    #[error("Proxy error: {message}")]
    Proxy { message: String },

    // Transport, other
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    // Arguments
    #[error("Invalid argument {field}: {message}")]
    InvalidArgument { field: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Plain socket failures: the peer is down or the route is gone.
fn is_transport_io_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        kind,
        ConnectionRefused
            | ConnectionReset
            | ConnectionAborted
            | NotConnected
            | AddrNotAvailable
            | TimedOut
            | UnexpectedEof
    )
}

/// Whether an `io::Error` below `err` has a kind accepted by `pred`.
fn source_has_io_kind(
    err: &(dyn std::error::Error + 'static),
    pred: impl Fn(std::io::ErrorKind) -> bool,
) -> bool {
    let mut current = err.source();
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if pred(io.kind()) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Whether any error *below* `err` mentions one of `needles`. The top-level
/// error is skipped because its message carries the request URL.
fn source_mentions(err: &(dyn std::error::Error + 'static), needles: &[&str]) -> bool {
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string().to_lowercase();
        if needles.iter().any(|n| text.contains(n)) {
            return true;
        }
        current = e.source();
    }
    false
}

impl CacheError {
    /// Classify a reqwest failure. `timeout` is the limit the failed request
    /// ran under.
    ///
    /// Only the typed flags and the *source* chain are inspected: the
    /// top-level reqwest message embeds the request URL, which carries
    /// user-supplied search text.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return CacheError::Timeout(timeout);
        }
        if let Some(status) = err.status() {
            return CacheError::HttpStatus {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            };
        }

        let connect = err.is_connect();
        let refused = source_has_io_kind(&err, is_transport_io_kind);
        let proxy = source_mentions(&err, &["proxy", "tunnel"]);
        let tls = source_mentions(&err, &["certificate", "tls", "ssl", "handshake"]);
        let cause = std::error::Error::source(&err).map(|s| s.to_string());
        let message = err.without_url().to_string();

        match (connect, refused) {
            (true, true) => CacheError::Connection { message },
            (true, false) if proxy => CacheError::Proxy { message },
            (true, false) if tls => CacheError::Tls { message },
            (true, false) => CacheError::Connection { message },
            (false, _) => CacheError::Network { message, cause },
        }
    }

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CacheError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Transport failures that mean "the catalog is unreachable right now".
    ///
    /// These move a resolution into local-only mode. TLS and proxy failures
    /// are not in this class and always propagate.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            CacheError::Connection { .. } | CacheError::Timeout(_) | CacheError::OfflineMode
        )
    }

    /// Zero-match lookups, remote or local.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CacheError::ModelNotFound { .. }
                | CacheError::VersionNotFound { .. }
                | CacheError::ResourceNotFound { .. }
                | CacheError::LocalModelNotFound { .. }
                | CacheError::LocalVersionNotFound { .. }
                | CacheError::LocalFileNotFound { .. }
        )
    }

    /// Ambiguous lookups, remote or local.
    pub fn is_duplicated(&self) -> bool {
        matches!(
            self,
            CacheError::ModelDuplicated { .. }
                | CacheError::VersionDuplicated { .. }
                | CacheError::ResourceDuplicated { .. }
                | CacheError::LocalModelDuplicated { .. }
                | CacheError::LocalVersionDuplicated { .. }
                | CacheError::LocalFileDuplicated { .. }
        )
    }

    /// Candidate names attached to a duplicated lookup.
    pub fn candidates(&self) -> Option<&[String]> {
        match self {
            CacheError::ModelDuplicated { candidates, .. }
            | CacheError::VersionDuplicated { candidates, .. }
            | CacheError::ResourceDuplicated { candidates, .. }
            | CacheError::LocalModelDuplicated { candidates, .. }
            | CacheError::LocalVersionDuplicated { candidates, .. }
            | CacheError::LocalFileDuplicated { candidates, .. } => Some(candidates),
            _ => None,
        }
    }
}
