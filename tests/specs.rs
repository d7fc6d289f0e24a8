//! Behavioral specifications for the warden control plane.
//!
//! These tests are black-box: they drive the public engine surface against
//! fake external services and assert on durable state and event streams.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

// archive/
#[path = "specs/archive.rs"]
mod archive;

// planner/
#[path = "specs/planner.rs"]
mod planner;

// sandbox/
#[path = "specs/sandbox.rs"]
mod sandbox;

// findings/
#[path = "specs/findings.rs"]
mod findings;

// queue/
#[path = "specs/job_ids.rs"]
mod job_ids;
#[path = "specs/rate_limit.rs"]
mod rate_limit;

// pipeline/
#[path = "specs/pipeline.rs"]
mod pipeline;
#[path = "specs/recovery.rs"]
mod recovery;
