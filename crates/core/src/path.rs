// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive and revision path normalization.
//!
//! Every stored file path is POSIX-style, relative, and free of traversal
//! segments. Rejection here is what keeps slip traversal and symlink-style
//! escapes out of revisions.

use thiserror::Error;

/// Errors from path normalization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("unsafe archive path: {0}")]
    Unsafe(String),
    #[error("empty path")]
    Empty,
}

/// Normalize a file path to POSIX form, rejecting unsafe shapes.
///
/// Accepts `/` or `\` separators on input. Rejects absolute paths, Windows
/// drive prefixes, `..` segments, and NUL bytes. `.` segments and duplicate
/// separators are collapsed.
pub fn normalize_path(raw: &str) -> Result<String, PathError> {
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    if raw.contains('\0') {
        return Err(PathError::Unsafe(raw.replace('\0', "<NUL>")));
    }

    let unified = raw.replace('\\', "/");

    if unified.starts_with('/') {
        return Err(PathError::Unsafe(raw.to_string()));
    }
    if has_drive_prefix(&unified) {
        return Err(PathError::Unsafe(raw.to_string()));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathError::Unsafe(raw.to_string())),
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }

    Ok(segments.join("/"))
}

/// `C:` / `c:` style prefix on the first segment.
fn has_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(c), Some(':')) if c.is_ascii_alphabetic()
    )
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
