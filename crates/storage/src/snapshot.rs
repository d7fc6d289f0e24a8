// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog snapshot persistence for crash recovery.
//!
//! Snapshots store the complete catalog at a journal sequence number,
//! zstd-compressed. Recovery loads the snapshot and replays journal
//! entries after that sequence. The snapshot must be durable (including
//! the rename) before the journal is truncated.

use crate::catalog::Catalog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

const COMPRESSION_LEVEL: i32 = 3;

/// A snapshot of the catalog at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Journal sequence number at the time of snapshot
    pub seq: u64,
    pub catalog: Catalog,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(seq: u64, catalog: Catalog) -> Self {
        Self {
            seq,
            catalog,
            created_at: Utc::now(),
        }
    }

    /// Save the snapshot atomically (write to .tmp, fsync, then rename).
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");

        {
            let file = File::create(&tmp_path)?;
            let writer = BufWriter::new(file);
            let mut encoder = zstd::Encoder::new(writer, COMPRESSION_LEVEL)
                .map_err(SnapshotError::Io)?;
            serde_json::to_writer(&mut encoder, self)?;
            let writer = encoder.finish().map_err(SnapshotError::Io)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load the snapshot if it exists.
    ///
    /// Returns `Ok(None)` if the file is missing or corrupt. Corrupt
    /// snapshots are sidelined for inspection so recovery can proceed via
    /// journal replay alone.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let decoded = zstd::Decoder::new(reader)
            .map_err(SnapshotError::Io)
            .and_then(|decoder| serde_json::from_reader(decoder).map_err(SnapshotError::Json));

        match decoded {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                let sidelined = sideline_corrupt_file(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    sidelined = %sidelined.display(),
                    "Corrupt snapshot, sidelining it and recovering from the journal",
                );
                fs::rename(path, &sidelined)?;
                Ok(None)
            }
        }
    }
}

/// Sideline slots kept per catalog file.
const CORRUPT_SLOTS: u32 = 3;

/// Where to move a corrupt catalog file (snapshot or journal) so the
/// operator can inspect what recovery threw away.
///
/// Targets `<file>.corrupt-N`, with the suffix appended to the full file
/// name so journal and snapshot sidelines never collide. Picks the first
/// free slot, or, when every slot is taken, the stalest one by
/// modification time: corrupt files never pile up past [`CORRUPT_SLOTS`]
/// and the freshest evidence always wins.
pub(crate) fn sideline_corrupt_file(path: &Path) -> PathBuf {
    let slot = |n: u32| {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".corrupt-{n}"));
        PathBuf::from(name)
    };

    let mut stalest: Option<(std::time::SystemTime, PathBuf)> = None;
    for n in 1..=CORRUPT_SLOTS {
        let candidate = slot(n);
        let Ok(meta) = fs::metadata(&candidate) else {
            return candidate;
        };
        let modified = meta
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        let staler = match &stalest {
            Some((current, _)) => modified < *current,
            None => true,
        };
        if staler {
            stalest = Some((modified, candidate));
        }
    }

    match stalest {
        Some((_, candidate)) => candidate,
        // Only reachable if CORRUPT_SLOTS were zero.
        None => slot(1),
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
