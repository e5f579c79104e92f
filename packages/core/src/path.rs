//! Path rules shared by every bucket.
//!
//! Bucket paths are forward-slash separated, relative strings: no leading
//! slash, no trailing slash, platform separators converted to `/`.

use std::path::MAIN_SEPARATOR;

use crate::{Error, Result};

/// Mask applied to file modes: permission bits only.
pub const MODE_MASK: u32 = 0o777;

/// Normalize a raw path into a bucket path.
///
/// ```rust
/// use bucketfs_core::norm_path;
///
/// assert_eq!(norm_path("/a/b/"), "a/b");
/// assert_eq!(norm_path("a/b"), "a/b");
/// assert_eq!(norm_path(norm_path("//x//").as_str()), norm_path("//x//"));
/// ```
pub fn norm_path(raw: &str) -> String {
    let converted;
    let raw = if MAIN_SEPARATOR == '/' {
        raw
    } else {
        converted = raw.replace(MAIN_SEPARATOR, "/");
        converted.as_str()
    };
    raw.trim_matches('/').to_string()
}

/// Mask a numeric mode to its permission bits.
pub fn norm_mode(mode: u32) -> u16 {
    (mode & MODE_MASK) as u16
}

/// Parse an octal mode string (`"644"`, `"0644"`, `"0o644"`) and mask it.
pub fn parse_mode(value: &str) -> Result<u16> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(Error::InvalidMode {
            value: value.to_string(),
        });
    }
    u32::from_str_radix(digits, 8)
        .map(norm_mode)
        .map_err(|_| Error::InvalidMode {
            value: value.to_string(),
        })
}

/// Join a normalized path onto a prefix. An empty prefix is a no-op.
pub fn join(prefix: &str, path: &str) -> String {
    let path = norm_path(path);
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path,
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, path),
    }
}

/// Strip a prefix from a full path.
///
/// Returns `None` when `full` does not live under `prefix`.
pub fn strip<'a>(prefix: &str, full: &'a str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(full);
    }
    full.strip_prefix(prefix)?.strip_prefix('/')
}

/// Check that no segment of a normalized path climbs out of its root.
pub(crate) fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

/// Reject paths that would escape the bucket namespace.
pub fn ensure_contained(path: &str) -> Result<()> {
    if has_parent_segment(path) {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            message: "parent directory segments are not allowed".to_string(),
        });
    }
    Ok(())
}
