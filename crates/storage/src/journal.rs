// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL catalog journal.
//!
//! Every committed catalog transaction appends its events here before they
//! are applied, enabling crash recovery via snapshot + replay. Each entry
//! is a single line of JSON: `{"seq":N,"event":{...}}\n`. A corrupt tail
//! (torn write at crash) is sidelined and the valid prefix kept.

use crate::catalog::CatalogEvent;
use crate::snapshot::sideline_corrupt_file;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialization helper for writing entries without cloning the event.
#[derive(Serialize)]
struct JournalRecordRef<'a> {
    seq: u64,
    event: &'a CatalogEvent,
}

#[derive(Deserialize)]
struct JournalRecord {
    seq: u64,
    event: CatalogEvent,
}

/// A single journal entry with sequence number
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub seq: u64,
    pub event: CatalogEvent,
}

/// Append-only JSONL journal. Commits are flushed and synced eagerly: a
/// transaction is durable before its events are applied to the catalog.
pub struct Journal {
    file: File,
    path: PathBuf,
    /// Highest sequence number written
    write_seq: u64,
}

impl Journal {
    /// Open or create a journal, returning it plus every valid entry for
    /// replay. A corrupt tail is sidelined, keeping the valid prefix.
    pub fn open(path: &Path) -> Result<(Self, Vec<JournalEntry>), JournalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (entries, corrupt) = Self::scan(&file)?;

        let file = if corrupt {
            drop(file);
            let sidelined = sideline_corrupt_file(path);
            warn!(
                path = %path.display(),
                sidelined = %sidelined.display(),
                valid_entries = entries.len(),
                "Corrupt journal tail detected, sidelining it and preserving valid entries",
            );
            std::fs::rename(path, &sidelined)?;

            let mut new_file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)?;
            for entry in &entries {
                let line = serde_json::to_vec(&JournalRecordRef {
                    seq: entry.seq,
                    event: &entry.event,
                })?;
                new_file.write_all(&line)?;
                new_file.write_all(b"\n")?;
            }
            new_file.sync_all()?;
            new_file
        } else {
            file
        };

        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);

        Ok((
            Self {
                file,
                path: path.to_owned(),
                write_seq,
            },
            entries,
        ))
    }

    /// Scan the journal, returning all valid entries and whether a corrupt
    /// line cut the scan short.
    fn scan(file: &File) -> Result<(Vec<JournalEntry>, bool), JournalError> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut corrupt = false;
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    corrupt = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JournalRecord>(trimmed) {
                Ok(record) => entries.push(JournalEntry {
                    seq: record.seq,
                    event: record.event,
                }),
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }

        Ok((entries, corrupt))
    }

    /// Append a committed transaction. Every event gets the next sequence
    /// number; the write is synced before returning.
    pub fn append_commit(&mut self, events: &[CatalogEvent]) -> Result<u64, JournalError> {
        let mut buf = Vec::new();
        for event in events {
            self.write_seq += 1;
            serde_json::to_writer(
                &mut buf,
                &JournalRecordRef {
                    seq: self.write_seq,
                    event,
                },
            )?;
            buf.push(b'\n');
        }
        self.file.write_all(&buf)?;
        self.file.sync_data()?;
        Ok(self.write_seq)
    }

    /// Drop all entries. Called after the catalog has been snapshotted
    /// durably; the snapshot must land before this does.
    pub fn truncate(&mut self) -> Result<(), JournalError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
