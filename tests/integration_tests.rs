//! Integration tests for chuid
//!
//! These tests drive the full scan pipeline over temporary directory trees.
//! Ownership changes require privileges the test environment does not have,
//! so every scan runs in dry-run mode; the intended-change counters and the
//! log file are the observable surface.

use chuid::config::ScanConfig;
use chuid::input::{parse_exclude_file, parse_mapping_file, ExcludeFilter, Mappings};
use chuid::logfile::{LogWriter, LOG_FILE_NAME};
use chuid::walker::ScanCoordinator;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use tempfile::{tempdir, NamedTempFile, TempDir};

fn scan_config(log_dir: &TempDir, workers: usize) -> ScanConfig {
    ScanConfig {
        mapping_file: PathBuf::from("unused"),
        roots_file: PathBuf::from("unused"),
        exclude_file: None,
        log_dir: log_dir.path().to_path_buf(),
        worker_count: workers,
        busy_threshold: 0.9,
        progress_interval: None,
        dual_pool: true,
        stack_mode: true,
        dry_run: true,
        verbose: false,
    }
}

fn run_scan(
    config: ScanConfig,
    mappings: Mappings,
    excludes: ExcludeFilter,
    roots: &[PathBuf],
) -> (chuid::walker::ScanResult, String) {
    let log_path = config.log_dir.join(LOG_FILE_NAME);
    let writer = LogWriter::create(&config.log_dir).unwrap();

    let mut coordinator = ScanCoordinator::new(config, mappings, excludes, writer.handle());
    coordinator.seed_roots(roots).unwrap();
    let result = coordinator.run().unwrap();

    writer.finish().unwrap();
    let log = std::fs::read_to_string(log_path).unwrap();
    (result, log)
}

fn current_uid() -> u32 {
    let probe = tempdir().unwrap();
    std::fs::metadata(probe.path()).unwrap().uid()
}

#[test]
fn test_scan_applies_mapping_to_every_entry_kind() {
    let tree = tempdir().unwrap();
    std::fs::write(tree.path().join("file"), b"x").unwrap();
    std::fs::create_dir(tree.path().join("dir")).unwrap();
    std::fs::write(tree.path().join("dir/nested"), b"y").unwrap();
    std::os::unix::fs::symlink("file", tree.path().join("link")).unwrap();

    let mut mappings = Mappings::default();
    mappings.uids.push(current_uid(), 54321);

    let log_dir = tempdir().unwrap();
    let (result, _log) = run_scan(
        scan_config(&log_dir, 4),
        mappings,
        ExcludeFilter::empty(),
        &[tree.path().to_path_buf()],
    );

    assert!(result.completed);
    assert_eq!(result.totals.files, 2);
    assert_eq!(result.totals.dirs, 1);
    assert_eq!(result.totals.links, 1);
    // one intended uid change per visited entry, including the symlink itself
    assert_eq!(result.totals.changed, 4);
    assert_eq!(result.totals.errors, 0);
}

#[test]
fn test_hardlinked_inode_changed_at_most_once() {
    let tree = tempdir().unwrap();
    std::fs::write(tree.path().join("x"), b"data").unwrap();
    std::fs::hard_link(tree.path().join("x"), tree.path().join("y")).unwrap();
    std::fs::hard_link(tree.path().join("x"), tree.path().join("z")).unwrap();

    let mut mappings = Mappings::default();
    mappings.uids.push(current_uid(), 54321);

    let log_dir = tempdir().unwrap();
    let (result, _log) = run_scan(
        scan_config(&log_dir, 4),
        mappings,
        ExcludeFilter::empty(),
        &[tree.path().to_path_buf()],
    );

    // three directory entries, one underlying inode
    assert_eq!(result.totals.files, 1);
    assert_eq!(result.totals.changed, 1);
}

#[test]
fn test_excluded_subtree_is_untouched() {
    let tree = tempdir().unwrap();
    std::fs::write(tree.path().join("keep"), b"x").unwrap();
    std::fs::create_dir_all(tree.path().join("skip/deep")).unwrap();
    std::fs::write(tree.path().join("skip/deep/hidden"), b"y").unwrap();

    let mut exclude_file = NamedTempFile::new().unwrap();
    writeln!(exclude_file, "skip").unwrap();
    let excludes = parse_exclude_file(exclude_file.path()).unwrap();

    let mut mappings = Mappings::default();
    mappings.uids.push(current_uid(), 54321);

    let log_dir = tempdir().unwrap();
    let (result, _log) = run_scan(
        scan_config(&log_dir, 2),
        mappings,
        excludes,
        &[tree.path().to_path_buf()],
    );

    // nothing below skip/ was stat'd or counted
    assert_eq!(result.totals.files, 1);
    assert_eq!(result.totals.dirs, 0);
    assert_eq!(result.totals.changed, 1);
}

#[test]
fn test_empty_mapping_visits_everything_changes_nothing() {
    let tree = tempdir().unwrap();
    for d in 0..4 {
        let dir = tree.path().join(format!("d{d}"));
        std::fs::create_dir(&dir).unwrap();
        for f in 0..5 {
            std::fs::write(dir.join(format!("f{f}")), b"x").unwrap();
        }
    }

    let log_dir = tempdir().unwrap();
    let (result, _log) = run_scan(
        scan_config(&log_dir, 4),
        Mappings::default(),
        ExcludeFilter::empty(),
        &[tree.path().to_path_buf()],
    );

    assert_eq!(result.totals.dirs, 4);
    assert_eq!(result.totals.files, 20);
    assert_eq!(result.totals.changed, 0);
}

#[test]
fn test_multiple_roots_and_bad_root_warning() {
    let tree_a = tempdir().unwrap();
    let tree_b = tempdir().unwrap();
    std::fs::write(tree_a.path().join("a"), b"x").unwrap();
    std::fs::write(tree_b.path().join("b"), b"y").unwrap();

    let log_dir = tempdir().unwrap();
    let (result, log) = run_scan(
        scan_config(&log_dir, 2),
        Mappings::default(),
        ExcludeFilter::empty(),
        &[
            tree_a.path().to_path_buf(),
            PathBuf::from("/no/such/root"),
            tree_b.path().to_path_buf(),
        ],
    );

    assert_eq!(result.roots_scanned, 2);
    assert_eq!(result.totals.files, 2);
    assert!(log.contains("WARNING: couldn't stat </no/such/root>"));
}

#[test]
fn test_handover_pressure_preserves_exactly_once_semantics() {
    // threshold 1.0 keeps the idleness probe firing, so descriptors bounce
    // between workers through the global pools with resume cursors in play
    let tree = tempdir().unwrap();
    let mut total_files = 0u64;
    for d in 0..12 {
        let dir = tree.path().join(format!("d{d}"));
        std::fs::create_dir(&dir).unwrap();
        for f in 0..20 {
            std::fs::write(dir.join(format!("f{f}")), b"x").unwrap();
            total_files += 1;
        }
        let sub = dir.join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("leaf"), b"y").unwrap();
        total_files += 1;
    }

    let mut mappings = Mappings::default();
    mappings.uids.push(current_uid(), 54321);

    let log_dir = tempdir().unwrap();
    let mut config = scan_config(&log_dir, 4);
    config.busy_threshold = 1.0;

    let (result, _log) = run_scan(
        config,
        mappings,
        ExcludeFilter::empty(),
        &[tree.path().to_path_buf()],
    );

    assert!(result.completed);
    assert_eq!(result.totals.files, total_files);
    assert_eq!(result.totals.dirs, 24);
    // every visited entry matched the mapping exactly once
    assert_eq!(
        result.totals.changed,
        result.totals.files + result.totals.dirs
    );
}

#[test]
fn test_breadth_first_mode_visits_the_same_set() {
    let tree = tempdir().unwrap();
    let mut path = tree.path().to_path_buf();
    for depth in 0..6 {
        path.push(format!("d{depth}"));
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("leaf"), b"x").unwrap();
    }

    let log_dir = tempdir().unwrap();
    let mut config = scan_config(&log_dir, 2);
    config.stack_mode = false;
    config.dual_pool = false;

    let (result, _log) = run_scan(
        config,
        Mappings::default(),
        ExcludeFilter::empty(),
        &[tree.path().to_path_buf()],
    );

    assert_eq!(result.totals.dirs, 6);
    assert_eq!(result.totals.files, 6);
}

#[test]
fn test_mapping_file_to_scan_pipeline() {
    let uid = current_uid();

    let mut mapping_file = NamedTempFile::new().unwrap();
    writeln!(mapping_file, "# remap the test user").unwrap();
    writeln!(mapping_file, "u:{} 54321", uid).unwrap();
    writeln!(mapping_file, "g:999999 1").unwrap();
    let mappings = parse_mapping_file(mapping_file.path()).unwrap();

    let tree = tempdir().unwrap();
    std::fs::write(tree.path().join("mine"), b"x").unwrap();

    let log_dir = tempdir().unwrap();
    let (result, _log) = run_scan(
        scan_config(&log_dir, 2),
        mappings,
        ExcludeFilter::empty(),
        &[tree.path().to_path_buf()],
    );

    // the uid rule matches, the gid rule matches nothing on this tree
    assert_eq!(result.totals.changed, 1);
}
