// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Revision file-set diffing

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warden_core::RevisionFile;

/// Path-level difference between two revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
}

/// Compare by path first, digest second.
pub fn diff_files(old: &[RevisionFile], new: &[RevisionFile]) -> FileDiff {
    let old_by_path: BTreeMap<&str, &str> = old
        .iter()
        .map(|f| (f.path.as_str(), f.digest.as_str()))
        .collect();
    let new_by_path: BTreeMap<&str, &str> = new
        .iter()
        .map(|f| (f.path.as_str(), f.digest.as_str()))
        .collect();

    let mut diff = FileDiff::default();
    for (path, digest) in &new_by_path {
        match old_by_path.get(path) {
            None => diff.added.push(path.to_string()),
            Some(old_digest) if old_digest != digest => diff.modified.push(path.to_string()),
            Some(_) => diff.unchanged.push(path.to_string()),
        }
    }
    for path in old_by_path.keys() {
        if !new_by_path.contains_key(path) {
            diff.removed.push(path.to_string());
        }
    }
    diff
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
