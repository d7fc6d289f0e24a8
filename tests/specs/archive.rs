//! Archive validator specifications (spec scenario 1)

use warden_core::{validate_entries, ArchiveEntry, ArchiveLimits};

fn limits(max_files: usize, max_bytes: u64) -> ArchiveLimits {
    ArchiveLimits {
        max_files,
        max_bytes,
    }
}

#[test]
fn path_traversal_is_rejected_with_unsafe_archive_path() {
    let entries = vec![ArchiveEntry::new("../secrets.env", 10)];
    let err = validate_entries(&entries, limits(300, 1000)).unwrap_err();
    assert!(err.to_string().contains("unsafe archive path"));
}

#[test]
fn a_valid_archive_yields_all_entries_normalized_and_distinct() {
    let entries = vec![
        ArchiveEntry::new("contracts/main.tact", 100),
        ArchiveEntry::new("./contracts/escrow.tact", 100),
        ArchiveEntry::new("wrappers\\Main.ts", 100),
    ];
    let out = validate_entries(&entries, limits(300, 1000)).unwrap();

    let paths: Vec<&str> = out.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["contracts/main.tact", "contracts/escrow.tact", "wrappers/Main.ts"]
    );
}

#[test]
fn expansion_bombs_hit_the_byte_ceiling() {
    let entries: Vec<ArchiveEntry> = (0..10)
        .map(|i| ArchiveEntry::new(format!("c{i}.tact"), 200))
        .collect();
    let err = validate_entries(&entries, limits(300, 1000)).unwrap_err();
    assert!(err.to_string().contains("uncompressed bytes"));
}
