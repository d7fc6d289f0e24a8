// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object store abstraction and implementations.
//!
//! The core needs only `get`/`put`/`delete` over immutable blobs and
//! append-only artifacts; no locking. Keys are slash-separated and come
//! from [`keys`].

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from object storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("transient storage error: {0}")]
    Transient(String),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    /// Whether a retry may help.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            StoreError::NotFound(_) | StoreError::InvalidKey(_) => false,
        }
    }
}

/// HTTP statuses an object-store backend should treat as transient.
pub fn is_transient_status(code: u16) -> bool {
    code >= 500 || matches!(code, 408 | 425 | 429)
}

/// Get/Put/Delete over immutable objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Filesystem-backed object store. Keys map to paths under the root.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        // Keys are internal, but a traversal segment would escape the root.
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|s| s == "..") {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Storage key layout.
pub mod keys {
    use warden_core::AuditRunId;

    pub fn general_blob(digest: &str, unique: &str) -> String {
        format!("blobs/{digest}-{unique}.txt")
    }

    pub fn revision_file(revision_id: &str, unique: &str) -> String {
        format!("revisions/{revision_id}/files/{unique}")
    }

    pub fn audit_prompt(run: &AuditRunId) -> String {
        format!("audits/{run}/prompt.txt")
    }

    pub fn audit_model_result(run: &AuditRunId) -> String {
        format!("audits/{run}/model-result.json")
    }

    pub fn audit_primary_error(run: &AuditRunId) -> String {
        format!("audits/{run}/primary-error.json")
    }

    pub fn verification_stdout(run: &AuditRunId, step: &str) -> String {
        format!("verification/{run}/{step}/stdout")
    }

    pub fn verification_stderr(run: &AuditRunId, step: &str) -> String {
        format!("verification/{run}/{step}/stderr")
    }

    pub fn verification_diagnostics(run: &AuditRunId) -> String {
        format!("verification/{run}/diagnostics")
    }

    pub fn verification_sandbox_results(run: &AuditRunId) -> String {
        format!("verification/{run}/sandbox-results")
    }

    pub fn verification_security_scans(run: &AuditRunId) -> String {
        format!("verification/{run}/security-scans")
    }

    pub fn pdf_final(run: &AuditRunId, epoch_ms: u64) -> String {
        format!("pdf/{run}/final/{epoch_ms}.pdf")
    }
}

/// In-memory object store for tests.
#[cfg(any(test, feature = "test-support"))]
pub struct InMemoryObjectStore {
    objects: parking_lot::Mutex<std::collections::HashMap<String, Vec<u8>>>,
    /// Number of put calls that should fail transiently before succeeding
    put_failures: std::sync::atomic::AtomicU32,
}

#[cfg(any(test, feature = "test-support"))]
impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: parking_lot::Mutex::new(std::collections::HashMap::new()),
            put_failures: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Make the next `n` puts fail with a transient error.
    pub fn fail_next_puts(&self, n: u32) {
        self.put_failures
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        use std::sync::atomic::Ordering;
        if self
            .put_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Transient("injected put failure".to_string()));
        }
        self.objects.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "object_tests.rs"]
mod tests;
