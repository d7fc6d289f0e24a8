// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project entity and lifecycle

use crate::id::{ProjectId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Project lifecycle state.
///
/// `Initializing` becomes `Ready` on the first successful ingest; a failed
/// ingest also returns the project to `Ready` rather than deleting it.
/// `Deleted` is only ever written by an explicit soft-delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectLifecycle {
    Initializing,
    Ready,
    Deleted,
}

impl fmt::Display for ProjectLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectLifecycle::Initializing => write!(f, "initializing"),
            ProjectLifecycle::Ready => write!(f, "ready"),
            ProjectLifecycle::Deleted => write!(f, "deleted"),
        }
    }
}

/// A project: the unit of ownership and of the single-active-audit guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub owner: UserId,
    #[serde(default)]
    pub members: Vec<UserId>,
    pub lifecycle: ProjectLifecycle,
    pub created_at_ms: u64,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>, owner: UserId, now_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            owner,
            members: Vec::new(),
            lifecycle: ProjectLifecycle::Initializing,
            created_at_ms: now_ms,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle == ProjectLifecycle::Deleted
    }
}
