// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive entry validation.
//!
//! Runs over entry headers before any bytes are extracted, so expansion
//! bombs and slip traversal never reach the filesystem.

use crate::language::{is_accepted_extension, is_test_path, Language};
use crate::path::{normalize_path, PathError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// A raw archive entry header: path plus uncompressed size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub path: String,
    pub uncompressed_size: u64,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, uncompressed_size: u64) -> Self {
        Self {
            path: path.into(),
            uncompressed_size,
        }
    }
}

/// Ceilings applied to an incoming archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLimits {
    pub max_files: usize,
    pub max_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_files: 300,
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Errors from archive validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    #[error("archive has {count} entries, limit is {max}")]
    TooManyFiles { count: usize, max: usize },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("archive exceeds {max} uncompressed bytes")]
    TooLarge { max: u64 },
}

/// An entry that survived validation, tagged for revision storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedEntry {
    /// Normalized POSIX path
    pub path: String,
    pub uncompressed_size: u64,
    pub language: Language,
    pub is_test_file: bool,
}

/// Validate archive entry headers against the limits.
///
/// Order matters: the count ceiling applies to the raw entry list, unsafe
/// paths fail the whole archive, non-allow-listed extensions are silently
/// dropped, duplicates keep the first occurrence, and the byte ceiling is
/// checked as accepted sizes accumulate.
pub fn validate_entries(
    entries: &[ArchiveEntry],
    limits: ArchiveLimits,
) -> Result<Vec<ValidatedEntry>, ArchiveError> {
    if entries.len() > limits.max_files {
        return Err(ArchiveError::TooManyFiles {
            count: entries.len(),
            max: limits.max_files,
        });
    }

    let mut seen = HashSet::new();
    let mut accepted = Vec::new();
    let mut total_bytes = 0u64;

    for entry in entries {
        let path = normalize_path(&entry.path)?;

        if !is_accepted_extension(&path) {
            continue;
        }
        if !seen.insert(path.clone()) {
            continue;
        }

        total_bytes = total_bytes.saturating_add(entry.uncompressed_size);
        if total_bytes > limits.max_bytes {
            return Err(ArchiveError::TooLarge {
                max: limits.max_bytes,
            });
        }

        accepted.push(ValidatedEntry {
            language: Language::detect(&path),
            is_test_file: is_test_path(&path),
            path,
            uncompressed_size: entry.uncompressed_size,
        });
    }

    Ok(accepted)
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
