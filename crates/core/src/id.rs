// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entity identifiers and fresh-id sources

use std::sync::atomic::{AtomicU64, Ordering};

/// Declare the string-backed id types in one place.
///
/// Each id wraps a private `String`; construction goes through `new`, so
/// the wire shape (serde-transparent) stays the only other way in. The
/// impl surface is deliberately small: `new`, `as_str`, `Display`,
/// `From<&str>`, and comparison against string literals.
macro_rules! entity_ids {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {$(
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    )+};
}

entity_ids! {
    /// A project: the unit of ownership and of the single-active-audit
    /// guarantee.
    ProjectId,
    /// An immutable file-set snapshot of a project.
    RevisionId,
    /// One invocation of the audit pipeline.
    AuditRunId,
    /// A user's mutable editor overlay.
    WorkingCopyId,
    /// A payload waiting for (or consumed by) ingestion.
    UploadId,
    /// A finding row. Cross-audit identity lives in the fingerprint, not
    /// here.
    FindingId,
    /// A user identity, opaque to the core.
    UserId,
}

/// Hands out fresh identifier strings. Object-safe so dependency bundles
/// can carry it as `Arc<dyn IdSource>`.
pub trait IdSource: Send + Sync {
    fn fresh(&self) -> String;
}

/// Production source: random UUIDs.
pub struct UuidSource;

impl IdSource for UuidSource {
    fn fresh(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic source for tests: `<label>-1`, `<label>-2`, ...
pub struct CountingSource {
    label: String,
    counter: AtomicU64,
}

impl CountingSource {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdSource for CountingSource {
    fn fresh(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.label)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
