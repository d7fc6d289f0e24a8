// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed blob storage.
//!
//! Blobs are deduplicated by SHA-256 digest: the object store is only
//! touched when the digest is new, and a lost insert race resolves to the
//! winning row.

use crate::object::{keys, ObjectStore, StoreError};
use crate::store::{CatalogError, CatalogStore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use warden_core::{Clock, FileBlob, IdSource, RetryPolicy, RevisionId};

/// Errors from content-store operations
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl ContentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentError::Store(StoreError::NotFound(_)))
    }
}

/// Where a new blob's storage key should live.
#[derive(Debug, Clone, Copy)]
pub enum BlobKeyHint<'a> {
    /// `blobs/<digest>-<unique>.txt`
    General,
    /// `revisions/<revision>/files/<unique>`
    RevisionFile(&'a RevisionId),
}

/// Content store over the catalog's blob table and the object store.
#[derive(Clone)]
pub struct ContentStore {
    catalog: Arc<CatalogStore>,
    objects: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    policy: RetryPolicy,
}

impl ContentStore {
    pub fn new(
        catalog: Arc<CatalogStore>,
        objects: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            catalog,
            objects,
            clock,
            ids,
            policy: RetryPolicy::storage(),
        }
    }

    /// Compute the digest of `bytes`; return the existing blob row when the
    /// digest is known, otherwise upload under a fresh key and insert.
    pub async fn put_blob(
        &self,
        bytes: &[u8],
        mime_type: &str,
        hint: BlobKeyHint<'_>,
    ) -> Result<FileBlob, ContentError> {
        let digest = format!("{:x}", Sha256::digest(bytes));

        if let Some(existing) = self.catalog.read(|c| c.blob(&digest).cloned()) {
            debug!(digest = %digest, "blob already stored");
            return Ok(existing);
        }

        let unique = self.ids.fresh();
        let storage_key = match hint {
            BlobKeyHint::General => keys::general_blob(&digest, &unique),
            BlobKeyHint::RevisionFile(revision) => {
                keys::revision_file(revision.as_str(), &unique)
            }
        };

        self.put_with_retry(&storage_key, bytes).await?;

        let blob = FileBlob {
            digest: digest.clone(),
            size: bytes.len() as u64,
            storage_key,
            mime_type: mime_type.to_string(),
            created_at_ms: self.clock.epoch_ms(),
        };
        // A concurrent writer may have inserted the same digest while we
        // were uploading; the catalog hands back the winning row.
        let winner = self.catalog.insert_blob(blob)?;
        Ok(winner)
    }

    /// Read blob bytes, retrying transient errors.
    pub async fn get_blob_bytes(&self, storage_key: &str) -> Result<Vec<u8>, ContentError> {
        let mut attempt = 1;
        loop {
            match self.objects.get(storage_key).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && self.policy.should_retry(attempt) => {
                    warn!(key = storage_key, attempt, error = %e, "retrying blob read");
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn put_with_retry(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.objects.put(key, bytes).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && self.policy.should_retry(attempt) => {
                    warn!(key, attempt, error = %e, "retrying blob upload");
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// MIME type for a normalized source path.
pub fn mime_for_path(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("json") => "application/json",
        Some("md") => "text/markdown",
        Some("ts") | Some("js") => "application/javascript",
        _ => "text/plain",
    }
}

#[cfg(test)]
#[path = "content_tests.rs"]
mod tests;
