// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutable editor overlays on top of a base revision

use crate::id::{ProjectId, RevisionId, UserId, WorkingCopyId};
use crate::language::Language;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkingCopyStatus {
    Active,
    Archived,
}

/// A user's mutable overlay over a base revision.
///
/// At most one active copy exists per `(owner, base_revision)`. Files are
/// held inline rather than as blobs to keep editor round-trips cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingCopy {
    pub id: WorkingCopyId,
    pub project_id: ProjectId,
    pub base_revision_id: RevisionId,
    pub owner: UserId,
    pub status: WorkingCopyStatus,
    pub created_at_ms: u64,
}

impl WorkingCopy {
    pub fn is_active(&self) -> bool {
        self.status == WorkingCopyStatus::Active
    }
}

/// An inline file inside a working copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCopyFile {
    pub working_copy_id: WorkingCopyId,
    pub path: String,
    pub content: String,
    pub language: Language,
    pub is_test_file: bool,
}
