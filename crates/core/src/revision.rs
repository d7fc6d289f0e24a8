// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable revision snapshots and their file rows

use crate::id::{ProjectId, RevisionId};
use crate::language::Language;
use serde::{Deserialize, Serialize};

/// Where a revision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevisionSource {
    Upload,
    WorkingCopy,
}

/// An immutable file-set snapshot bound to a project.
///
/// Created once, never mutated; deletion only happens through retention
/// cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RevisionId>,
    pub source: RevisionSource,
    pub description: String,
    pub created_at_ms: u64,
}

impl Revision {
    pub fn new(
        id: RevisionId,
        project_id: ProjectId,
        source: RevisionSource,
        description: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            project_id,
            parent_id: None,
            source,
            description: description.into(),
            created_at_ms: now_ms,
        }
    }

    pub fn with_parent(mut self, parent: RevisionId) -> Self {
        self.parent_id = Some(parent);
        self
    }
}

/// Content-addressed file bytes in the object store. Unique on digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    /// Lowercase hex SHA-256 of the bytes
    pub digest: String,
    pub size: u64,
    pub storage_key: String,
    pub mime_type: String,
    pub created_at_ms: u64,
}

/// A `(revision, path)` row pointing at a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionFile {
    pub revision_id: RevisionId,
    /// Normalized POSIX path, unique within the revision
    pub path: String,
    pub digest: String,
    pub language: Language,
    pub is_test_file: bool,
}
