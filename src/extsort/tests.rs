use super::core::*;
use super::merge::*;
use crate::error::Error;
use crate::scheduler::CancelToken;
use std::fs;
use std::path::{Path, PathBuf};

/// Helper: write `content` to `name` inside `dir`.
fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn leftover_runs(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".run"))
        .count()
}

// ========== RunMerger ==========

#[test]
fn test_merger_interleaves_runs() {
    let dir = tempfile::tempdir().unwrap();
    let r1 = create_test_file(dir.path(), "r1", b"b\nd\n");
    let r2 = create_test_file(dir.path(), "r2", b"a\nc\n");
    let merged: Vec<Vec<u8>> = RunMerger::open(&[r1, r2])
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(merged, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
}

#[test]
fn test_merger_keeps_cross_run_duplicates_adjacent() {
    let dir = tempfile::tempdir().unwrap();
    let r1 = create_test_file(dir.path(), "r1", b"a\nx\n");
    let r2 = create_test_file(dir.path(), "r2", b"x\nz\n");
    let merged: Vec<Vec<u8>> = RunMerger::open(&[r1, r2])
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(merged, vec![b"a".to_vec(), b"x".to_vec(), b"x".to_vec(), b"z".to_vec()]);
}

#[test]
fn test_merger_no_runs() {
    let none: [PathBuf; 0] = [];
    assert!(RunMerger::open(&none).unwrap().next_record().unwrap().is_none());
}

// ========== ExternalSorter ==========

#[test]
fn test_phase2_merges_two_runs() {
    let dir = tempfile::tempdir().unwrap();
    // Budget of 4 bytes spills after every two single-byte records.
    let src = create_test_file(dir.path(), "leaf", b"b\nd\na\nc\n");
    let mut sorter = ExternalSorter::new(&src, 4);
    sorter.phase1().unwrap();
    assert_eq!(sorter.runs().len(), 2);
    assert_eq!(lines(&sorter.runs()[0]), vec!["b", "d"]);
    assert_eq!(lines(&sorter.runs()[1]), vec!["a", "c"]);

    let out = dir.path().join("leaf.tmp");
    sorter.phase2(&out).unwrap();
    assert_eq!(lines(&out), vec!["a", "b", "c", "d"]);
}

#[test]
fn test_sort_three_runs_nine_records() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_test_file(
        dir.path(),
        "leaf",
        b"r7\nr2\nr9\nr4\nr1\nr8\nr3\nr6\nr5\n",
    );
    // Three records of 3 bytes each fill a 9-byte budget.
    let mut sorter = ExternalSorter::new(&src, 9);
    sorter.phase1().unwrap();
    assert_eq!(sorter.runs().len(), 3);

    let out = dir.path().join("leaf.tmp");
    sorter.phase2(&out).unwrap();
    let runs: Vec<PathBuf> = sorter.runs().to_vec();
    assert!(runs.iter().all(|r| r.exists()));

    let mut sorter = ExternalSorter::new(&src, 9);
    sorter.sort(&out).unwrap();
    assert_eq!(
        lines(&out),
        vec!["r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9"]
    );
    assert!(sorter.runs().is_empty());
    assert_eq!(leftover_runs(dir.path()), 0);
}

#[test]
fn test_sort_removes_duplicates_within_and_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_test_file(dir.path(), "leaf", b"b\nb\na\nb\nc\na\nb\nc\n");
    let out = dir.path().join("out");
    ExternalSorter::new(&src, 4).sort(&out).unwrap();
    assert_eq!(lines(&out), vec!["a", "b", "c"]);
}

#[test]
fn test_sort_dedups_across_phase2_flushes() {
    let dir = tempfile::tempdir().unwrap();
    // A 2-byte budget flushes after every record, so the second "x" arrives
    // after the first one has already left the phase 2 set.
    let src = create_test_file(dir.path(), "leaf", b"x\nm\nx\na\n");
    let out = dir.path().join("out");
    let mut sorter = ExternalSorter::new(&src, 2);
    sorter.phase1().unwrap();
    assert_eq!(sorter.runs().len(), 4);
    sorter.phase2(&out).unwrap();
    assert_eq!(lines(&out), vec!["a", "m", "x"]);
}

#[test]
fn test_sort_large_budget_single_run() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_test_file(dir.path(), "leaf", b"pear\napple\nPear\napple\n");
    let out = dir.path().join("out");
    let mut sorter = ExternalSorter::new(&src, 1 << 20);
    sorter.phase1().unwrap();
    assert_eq!(sorter.runs().len(), 1);
    sorter.phase2(&out).unwrap();
    assert_eq!(lines(&out), vec!["Pear", "apple", "pear"]);
}

#[test]
fn test_sort_skips_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_test_file(dir.path(), "leaf", b"\nb\n   \n\na\n");
    let out = dir.path().join("out");
    ExternalSorter::new(&src, 1024).sort(&out).unwrap();
    assert_eq!(fs::read(&out).unwrap(), b"a\nb\n");
}

#[test]
fn test_sort_empty_source() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_test_file(dir.path(), "leaf", b"");
    let out = dir.path().join("out");
    let mut sorter = ExternalSorter::new(&src, 1024);
    sorter.sort(&out).unwrap();
    assert!(fs::read(&out).unwrap().is_empty());
    assert!(sorter.runs().is_empty());
}

#[test]
fn test_sort_unterminated_last_record() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_test_file(dir.path(), "leaf", b"b\na");
    let out = dir.path().join("out");
    ExternalSorter::new(&src, 1024).sort(&out).unwrap();
    assert_eq!(fs::read(&out).unwrap(), b"a\nb\n");
}

#[test]
fn test_sort_is_bytewise() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_test_file(dir.path(), "leaf", "\u{e9}\nz\nZ\n!\n".as_bytes());
    let out = dir.path().join("out");
    ExternalSorter::new(&src, 1024).sort(&out).unwrap();
    assert_eq!(lines(&out), vec!["!", "Z", "z", "\u{e9}"]);
}

#[test]
fn test_phase2_truncates_stale_output() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_test_file(dir.path(), "leaf", b"a\n");
    let out = create_test_file(dir.path(), "leaf.tmp", b"stale\n");
    ExternalSorter::new(&src, 1024).sort(&out).unwrap();
    assert_eq!(fs::read(&out).unwrap(), b"a\n");
}

#[test]
fn test_missing_source_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let err = ExternalSorter::new(dir.path().join("missing"), 1024)
        .sort(&out)
        .unwrap_err();
    assert!(matches!(err, Error::InputUnreadable { .. }));
}

#[test]
fn test_cancelled_sort_leaves_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = Vec::new();
    for i in 0..10_000 {
        content.extend_from_slice(format!("rec{:05}\n", i).as_bytes());
    }
    let src = create_test_file(dir.path(), "leaf", &content);
    let token = CancelToken::new();
    let mut sorter = ExternalSorter::new(&src, 1024).with_cancel(token.clone());
    sorter.phase1().unwrap();
    assert!(!sorter.runs().is_empty());
    token.cancel();
    let err = sorter.phase2(&dir.path().join("out")).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(sorter.runs().iter().all(|r| r.exists()));
}
