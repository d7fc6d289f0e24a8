// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uploaded payloads awaiting ingestion

use crate::archive::ArchiveEntry;
use crate::id::{ProjectId, UploadId};
use serde::{Deserialize, Serialize};

/// Shape of an uploaded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadKind {
    /// One source file, stored as-is
    Single,
    /// Gzipped tar archive
    Archive,
    /// A manifest of individually uploaded files
    FileSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Processed | UploadStatus::Failed)
    }
}

/// A manifest entry for `file-set` uploads: each file already sits in the
/// object store under its own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub entry: ArchiveEntry,
    pub storage_key: String,
}

/// A named payload in the object store, waiting for (or consumed by) ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub id: UploadId,
    pub project_id: ProjectId,
    pub name: String,
    pub kind: UploadKind,
    pub status: UploadStatus,
    pub storage_key: String,
    /// Present for `file-set` uploads only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Vec<ManifestEntry>>,
    pub created_at_ms: u64,
}
