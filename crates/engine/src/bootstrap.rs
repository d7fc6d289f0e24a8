// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide engine assembly.
//!
//! One bootstrap builds and owns the dependency bundle; tests construct
//! the same shape from fakes.

use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::control::ControlPlane;
use crate::pipeline::{recover, register_stages, StageDeps};
use crate::queue::QueueRuntime;
use std::sync::Arc;
use warden_adapters::{LlmClient, PdfRenderer, SandboxRunner};
use warden_core::{AuditRunId, Clock, IdSource, Stage};
use warden_storage::{CatalogStore, ContentStore, ObjectStore, RevisionStore};

/// The external-service clients the engine drives.
pub struct EngineAdapters {
    pub sandbox: Arc<dyn SandboxRunner>,
    pub llm: Arc<dyn LlmClient>,
    pub pdf: Arc<dyn PdfRenderer>,
}

/// A fully wired engine: queue runtime, stage handlers, control surface.
pub struct Engine {
    pub deps: StageDeps,
    pub runtime: QueueRuntime,
    pub control: ControlPlane,
}

impl Engine {
    /// Wire the engine and start consuming queues.
    pub fn start(
        catalog: Arc<CatalogStore>,
        objects: Arc<dyn ObjectStore>,
        adapters: EngineAdapters,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
        config: EngineConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new(catalog.clone(), clock.clone()));
        let runtime = QueueRuntime::new(bus.clone(), &config);
        let content = ContentStore::new(
            catalog.clone(),
            objects.clone(),
            clock.clone(),
            ids.clone(),
        );
        let revisions = RevisionStore::new(
            catalog.clone(),
            content.clone(),
            clock.clone(),
            ids.clone(),
        );

        let deps = StageDeps {
            catalog,
            objects,
            content,
            revisions,
            bus,
            queue: runtime.handle(),
            sandbox: adapters.sandbox,
            llm: adapters.llm,
            pdf: adapters.pdf,
            clock,
            ids,
            config,
        };
        register_stages(&runtime, &deps);

        let control = ControlPlane::new(deps.clone());
        Self {
            deps,
            runtime,
            control,
        }
    }

    /// Resume non-terminal audit runs after a restart. Call once, after
    /// `start`.
    pub fn recover(&self) -> Vec<(AuditRunId, Stage)> {
        recover(&self.deps)
    }
}
