//! Name normalization for matching and cache folder naming.
//!
//! Both functions are lossy: keys are only ever compared, never shown back
//! to the catalog as identities.

use crate::error::{CacheError, Result};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use std::sync::LazyLock;

/// Runs of anything that is not a Unicode letter or digit (underscore included).
static NON_ALNUM_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\W_]+").unwrap());

/// Comparison key: lowercase with every separator removed.
///
/// # Examples
///
/// ```
/// use civitai_cache::naming::strip_name;
///
/// assert_eq!(strip_name("Cetus-Mix"), "cetusmix");
/// assert_eq!(strip_name("cetus mix"), "cetusmix");
/// ```
pub fn strip_name(name: &str) -> String {
    NON_ALNUM_RUN
        .replace_all(&name.to_lowercase(), "")
        .into_owned()
}

/// Directory-safe key: lowercase, separator runs collapsed to one underscore,
/// leading and trailing underscores trimmed.
///
/// # Examples
///
/// ```
/// use civitai_cache::naming::soft_strip_name;
///
/// assert_eq!(soft_strip_name("amiya arknights (old)"), "amiya_arknights_old");
/// assert_eq!(soft_strip_name("v1.0"), "v1_0");
/// ```
pub fn soft_strip_name(name: &str) -> String {
    NON_ALNUM_RUN
        .replace_all(&name.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Whether two names are equal under [`strip_name`].
pub fn names_match(a: &str, b: &str) -> bool {
    strip_name(a) == strip_name(b)
}

/// Compile a filename glob (`*`, `?`, `[...]`).
///
/// Matching is case-sensitive and `*` crosses any character.
pub fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    if pattern.is_empty() {
        return Err(CacheError::invalid_argument(
            "pattern",
            "file pattern must not be empty",
        ));
    }
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| CacheError::invalid_argument("pattern", e.to_string()))
}
