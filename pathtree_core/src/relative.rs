//! Validation and normalization of tree-relative paths.

use crate::error::{Error, Result};
use std::borrow::Cow;

/// Whether `path` is absolute on any supported platform (`/x`, `\x`, `C:\x`, `C:/x`).
pub fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Whether any segment of `path` is exactly `..`.
///
/// File names that merely contain `..` (e.g. `a..b.txt`) are not traversal.
pub fn has_parent_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Reject paths that could escape a tree root.
pub fn ensure_relative(path: &str) -> Result<()> {
    if is_absolute(path) {
        return Err(Error::invalid_argument(format!(
            "Expected a path relative to the tree root but got an absolute path: {}",
            path
        )));
    }
    if has_parent_segment(path) {
        return Err(Error::invalid_argument(format!(
            "Relative path must not contain '..' segments: {}",
            path
        )));
    }
    Ok(())
}

/// Convert separators to `/` and drop trailing separators.
pub(crate) fn normalize(path: &str) -> Cow<'_, str> {
    let path: Cow<'_, str> = if path.contains('\\') {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        Cow::Borrowed(path)
    };
    if !path.ends_with('/') {
        return path;
    }
    match path {
        Cow::Borrowed(p) => Cow::Borrowed(p.trim_end_matches('/')),
        Cow::Owned(p) => Cow::Owned(p.trim_end_matches('/').to_string()),
    }
}

/// Validate then normalize a caller-supplied relative path.
pub(crate) fn checked(path: &str) -> Result<Cow<'_, str>> {
    ensure_relative(path)?;
    Ok(normalize(path))
}

/// Whether `path` is `prefix` itself or lies underneath it. The empty prefix contains everything.
pub(crate) fn is_under(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || (path.starts_with(prefix)
            && (path.len() == prefix.len() || path.as_bytes()[prefix.len()] == b'/'))
}
