//! Logical path handling for the embedded filesystem.
//!
//! A logical path addresses an entry inside the archive namespace. It is
//! always forward-slash separated, relative to the logical root, and
//! byte-wise case-sensitive on every platform. Normalization rules:
//!
//! - Backslashes are folded to forward slashes
//! - Redundant slashes are collapsed
//! - `.` components are removed and `..` components are resolved
//! - Leading slashes are stripped (queries for `/a/b` mean `a/b`)
//! - A path whose `..` components would climb above the logical root is
//!   rejected with [`PathEscape`](crate::ErrorKind::PathEscape) rather than
//!   clamped, because such a path never names anything the archive can hold
//!
//! The empty string is the normalized form of the logical root itself.

use crate::errors::{Error, ErrorKind};

/// Normalizes a logical path, rejecting escapes above the logical root.
pub fn normalize(path: &str) -> Result<String, Error> {
    let folded = path.replace('\\', "/");
    let mut result = String::with_capacity(folded.len());
    for component in folded.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }

        if component == ".." {
            match result.rfind('/') {
                Some(cut) => result.truncate(cut),
                None if !result.is_empty() => result.clear(),
                None => {
                    return Err(Error::from(ErrorKind::PathEscape {
                        path: path.to_string(),
                    }));
                }
            }
            continue;
        }

        if !result.is_empty() {
            result.push('/');
        }
        result.push_str(component);
    }

    Ok(result)
}

/// True when `stored` is already in normalized form.
///
/// Archive directories must only ever contain normalized paths; a stored
/// path that normalizes to something else (or to nothing) marks a corrupt or
/// hostile archive.
pub(crate) fn is_normalized(stored: &str) -> bool {
    !stored.is_empty() && matches!(normalize(stored), Ok(ref n) if n == stored)
}

/// The final component of a normalized path.
pub(crate) fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(cut) => &path[cut + 1..],
        None => path,
    }
}

/// Immediate parent of a normalized path; empty string is the logical root.
pub(crate) fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(cut) => &path[..cut],
        None => "",
    }
}
