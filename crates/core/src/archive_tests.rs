// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn limits(max_files: usize, max_bytes: u64) -> ArchiveLimits {
    ArchiveLimits {
        max_files,
        max_bytes,
    }
}

#[test]
fn path_traversal_fails_the_archive() {
    let entries = vec![ArchiveEntry::new("../secrets.env", 10)];
    let err = validate_entries(&entries, limits(300, 1000)).unwrap_err();
    assert!(err.to_string().contains("unsafe archive path"));
}

#[test]
fn too_many_entries_fails_before_anything_else() {
    let entries = vec![
        ArchiveEntry::new("a.tact", 1),
        ArchiveEntry::new("../evil", 1),
    ];
    let err = validate_entries(&entries, limits(1, 1000)).unwrap_err();
    assert_eq!(
        err,
        ArchiveError::TooManyFiles {
            count: 2,
            max: 1
        }
    );
}

#[test]
fn drops_disallowed_extensions() {
    let entries = vec![
        ArchiveEntry::new("contracts/main.tact", 100),
        ArchiveEntry::new("build/output.bin", 100),
        ArchiveEntry::new(".env", 5),
    ];
    let out = validate_entries(&entries, limits(300, 1000)).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].path, "contracts/main.tact");
}

#[test]
fn dedup_keeps_first_occurrence() {
    let entries = vec![
        ArchiveEntry::new("contracts/main.tact", 100),
        ArchiveEntry::new("./contracts//main.tact", 900),
    ];
    let out = validate_entries(&entries, limits(300, 1000)).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].uncompressed_size, 100);
}

#[test]
fn size_ceiling_counts_only_accepted_entries() {
    let entries = vec![
        ArchiveEntry::new("big.bin", 10_000),
        ArchiveEntry::new("contracts/main.tact", 400),
        ArchiveEntry::new("contracts/other.tact", 500),
    ];
    // The 10KB binary is dropped by the allow-list before it can count.
    let out = validate_entries(&entries, limits(300, 1000)).unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn running_total_over_limit_fails() {
    let entries = vec![
        ArchiveEntry::new("a.tact", 600),
        ArchiveEntry::new("b.tact", 600),
    ];
    let err = validate_entries(&entries, limits(300, 1000)).unwrap_err();
    assert_eq!(err, ArchiveError::TooLarge { max: 1000 });
}

#[test]
fn tags_language_and_test_flag() {
    let entries = vec![
        ArchiveEntry::new("contracts/escrow.tact", 10),
        ArchiveEntry::new("tests/escrow.spec.ts", 10),
    ];
    let out = validate_entries(&entries, limits(300, 1000)).unwrap();
    assert_eq!(out[0].language, Language::Tact);
    assert!(!out[0].is_test_file);
    assert_eq!(out[1].language, Language::TypeScript);
    assert!(out[1].is_test_file);
}

#[test]
fn valid_archive_yields_all_distinct_entries() {
    let entries: Vec<ArchiveEntry> = (0..20)
        .map(|i| ArchiveEntry::new(format!("contracts/c{i}.tact"), 10))
        .collect();
    let out = validate_entries(&entries, limits(300, 1000)).unwrap();
    assert_eq!(out.len(), 20);
    let paths: std::collections::HashSet<_> = out.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths.len(), 20);
}
