//! Worker thread logic for the parallel ownership scan
//!
//! Each worker:
//! - Pulls one subtree root at a time from the global pools
//! - Walks it with a private pool, depth-first (stack) or breadth-first
//!   (queue)
//! - Classifies every entry, applies UID/GID changes, dedups hardlinks
//! - Probes the busy ratio after every entry and hands its backlog to a
//!   global pool when too many peers are idle
//!
//! A worker never holds the dispatcher mutex across a filesystem
//! operation: directory streams are closed before `hand_over` is called.

use crate::input::ExcludeFilter;
use crate::logfile::LogHandle;
use crate::owner::{EntryKind, NameCache, OwnershipChanger};
use crate::walker::deq::{Deq, Subtree};
use crate::walker::dirstream::DirStream;
use crate::walker::dispatcher::Dispatcher;
use crate::walker::hardlink::{HardlinkSet, Mark};
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::WorkerError;

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Regular files visited (hardlink re-sightings excluded)
    pub files: AtomicU64,

    /// Directories visited
    pub dirs: AtomicU64,

    /// Symbolic links visited
    pub links: AtomicU64,

    /// Entries of any other type
    pub others: AtomicU64,

    /// Ownership changes applied (or reported in dry-run mode)
    pub changed: AtomicU64,

    /// Per-entry errors (stat, opendir, readdir failures)
    pub errors: AtomicU64,
}

impl WorkerStats {
    fn record_file(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dir(&self) {
        self.dirs.fetch_add(1, Ordering::Relaxed);
    }

    fn record_link(&self) {
        self.links.fetch_add(1, Ordering::Relaxed);
    }

    fn record_other(&self) {
        self.others.fetch_add(1, Ordering::Relaxed);
    }

    fn record_changed(&self, count: u64) {
        if count > 0 {
            self.changed.fetch_add(count, Ordering::Relaxed);
        }
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Aggregated totals across all workers
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkTotals {
    pub files: u64,
    pub dirs: u64,
    pub links: u64,
    pub others: u64,
    pub changed: u64,
    pub errors: u64,
}

/// Sum the statistics of a set of workers
pub fn aggregate_stats(stats: &[Arc<WorkerStats>]) -> WalkTotals {
    let mut totals = WalkTotals::default();
    for s in stats {
        totals.files += s.files.load(Ordering::Relaxed);
        totals.dirs += s.dirs.load(Ordering::Relaxed);
        totals.links += s.links.load(Ordering::Relaxed);
        totals.others += s.others.load(Ordering::Relaxed);
        totals.changed += s.changed.load(Ordering::Relaxed);
        totals.errors += s.errors.load(Ordering::Relaxed);
    }
    totals
}

/// Shared, read-only context handed to every worker
#[derive(Clone)]
pub struct WorkerContext {
    pub dispatcher: Arc<Dispatcher>,
    pub excludes: Arc<ExcludeFilter>,
    pub hardlinks: Arc<HardlinkSet>,
    pub changer: Arc<OwnershipChanger>,
    pub log: LogHandle,

    /// Depth-first private pool when true, breadth-first otherwise
    pub stack_mode: bool,

    /// Two-pool mode: count directories for speed estimation
    pub dual_pool: bool,
}

/// A worker thread that processes subtree roots until the scan completes
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(id: usize, ctx: WorkerContext) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("chuid-worker-{}", id))
            .spawn(move || worker_loop(id, ctx, stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| WorkerError::Panicked { id: self.id })?;
        }
        Ok(())
    }
}

/// Main worker loop: acquire, walk, release, until completion
fn worker_loop(id: usize, ctx: WorkerContext, stats: Arc<WorkerStats>) {
    info!(worker = id, "Worker starting");

    let mut names = NameCache::new();

    while let Some(sub) = ctx.dispatcher.acquire() {
        process_subtree(id, sub, &ctx, &stats, &mut names);
        ctx.dispatcher.release();
    }

    info!(
        worker = id,
        files = stats.files.load(Ordering::Relaxed),
        dirs = stats.dirs.load(Ordering::Relaxed),
        "Worker shutting down"
    );
}

/// Walk one subtree taken from a global pool.
///
/// The private pool starts with just the extracted root. Every directory
/// popped from it is iterated entry by entry; after each entry the idleness
/// probe may cut the iteration short, store a resume position, and hand all
/// but one private descriptor to a global pool.
fn process_subtree(
    id: usize,
    sub: Subtree,
    ctx: &WorkerContext,
    stats: &WorkerStats,
    names: &mut NameCache,
) {
    let mut private = Deq::new();
    private.push_front(sub);

    let anchor = Instant::now();
    let mut dirs_scanned: u64 = 0;

    while let Some(mut w) = private.pop_front() {
        if ctx.dual_pool {
            dirs_scanned += 1;
        }

        let mut dir = match DirStream::open(&w.path) {
            Ok(d) => d,
            Err(e) => {
                // w is dropped, not retried
                ctx.log
                    .warning(format!("couldn't open <{}>: {}", w.path.display(), e));
                stats.record_error();
                continue;
            }
        };
        if let Some(pos) = w.resume_pos {
            dir.seek(pos);
        }

        let mut idle_break = false;
        loop {
            let name = match dir.next_entry() {
                Ok(Some(n)) => n,
                Ok(None) => break,
                Err(e) => {
                    ctx.log.warning(format!(
                        "readdir() failed for directory <{}>: {}",
                        w.path.display(),
                        e
                    ));
                    stats.record_error();
                    break;
                }
            };

            if ctx.excludes.matches(&name) {
                continue;
            }

            let child = w.path.join(&name);
            match std::fs::symlink_metadata(&child) {
                Ok(meta) => {
                    process_child(ctx, stats, names, &mut private, &w, child, &meta);
                }
                Err(e) => {
                    ctx.log
                        .warning(format!("couldn't stat <{}>: {}", child.display(), e));
                    stats.record_error();
                }
            }

            // idleness probe, once per processed entry
            if ctx.dispatcher.too_many_idle() {
                idle_break = true;
                w.resume_pos = Some(dir.tell());
                // one raw read decides whether w still has entries; the
                // probed entry is replayed by the later seek
                match dir.next_any() {
                    Ok(Some(_)) => private.push_back(w),
                    Ok(None) => {}
                    Err(e) => {
                        ctx.log.warning(format!(
                            "readdir() at resume check failed for directory <{}>: {}",
                            w.path.display(),
                            e
                        ));
                        stats.record_error();
                    }
                }
                break;
            }
        }

        // close the stream before touching the global pools
        drop(dir);

        if idle_break && private.len() > 1 {
            let idle = ctx.dispatcher.worker_total() - ctx.dispatcher.busy_count();
            ctx.log
                .info(format!("too many idle threads ({:3}) detected", idle));

            let elapsed = anchor.elapsed().as_secs_f64();
            let speed = if elapsed > 0.0 {
                dirs_scanned as f64 / elapsed
            } else {
                dirs_scanned as f64
            };

            // keep the head descriptor, hand the rest over
            let kept = match private.pop_front() {
                Some(k) => k,
                None => continue,
            };
            let handed = private.len();
            ctx.dispatcher.hand_over(&mut private, speed);
            private.push_front(kept);

            debug!(worker = id, handed, speed, "Backlog handed over");
            dirs_scanned = 0;
        }
    }
}

/// Classify one directory entry and apply any ownership change
fn process_child(
    ctx: &WorkerContext,
    stats: &WorkerStats,
    names: &mut NameCache,
    private: &mut Deq,
    w: &Subtree,
    child: std::path::PathBuf,
    meta: &Metadata,
) {
    let ft = meta.file_type();

    if ft.is_file() {
        if meta.nlink() > 1 && ctx.hardlinks.mark(meta.dev(), meta.ino()) == Mark::Seen {
            // another path to this inode was already handled
            return;
        }
        let changed = ctx
            .changer
            .apply(&child, meta.uid(), meta.gid(), EntryKind::File, names);
        stats.record_changed(changed);
        stats.record_file();
    } else if ft.is_symlink() {
        let changed = ctx
            .changer
            .apply(&child, meta.uid(), meta.gid(), EntryKind::Symlink, names);
        stats.record_changed(changed);
        stats.record_link();
    } else if ft.is_dir() {
        let changed = ctx
            .changer
            .apply(&child, meta.uid(), meta.gid(), EntryKind::Directory, names);
        stats.record_changed(changed);
        stats.record_dir();
        let subtree = Subtree::new(child, Arc::clone(&w.root));
        if ctx.stack_mode {
            private.push_front(subtree);
        } else {
            private.push_back(subtree);
        }
    } else {
        stats.record_other();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Mappings;
    use crate::logfile::LogWriter;
    use crate::walker::deq::Subtree;
    use std::path::{Path, PathBuf};
    use tempfile::{tempdir, TempDir};

    struct Harness {
        ctx: WorkerContext,
        stats: Arc<WorkerStats>,
        _writer: LogWriter,
        _logdir: TempDir,
    }

    fn harness(excludes: ExcludeFilter, mappings: Mappings) -> Harness {
        let logdir = tempdir().unwrap();
        let writer = LogWriter::create(logdir.path()).unwrap();
        let log = writer.handle();
        let ctx = WorkerContext {
            dispatcher: Arc::new(Dispatcher::new(1, 0.9, false, true)),
            excludes: Arc::new(excludes),
            hardlinks: Arc::new(HardlinkSet::new()),
            changer: Arc::new(OwnershipChanger::new(Arc::new(mappings), true, log.clone())),
            log,
            stack_mode: true,
            dual_pool: false,
        };
        Harness {
            ctx,
            stats: Arc::new(WorkerStats::default()),
            _writer: writer,
            _logdir: logdir,
        }
    }

    fn run_scan(h: &Harness, root: &Path) {
        h.ctx.dispatcher.seed(Subtree::new(
            root.to_path_buf(),
            Arc::new(root.to_path_buf()),
        ));
        worker_loop(0, h.ctx.clone(), Arc::clone(&h.stats));
    }

    #[test]
    fn test_walk_counts_entry_types() {
        let tree = tempdir().unwrap();
        std::fs::write(tree.path().join("f1"), b"x").unwrap();
        std::fs::write(tree.path().join("f2"), b"y").unwrap();
        std::fs::create_dir(tree.path().join("sub")).unwrap();
        std::fs::write(tree.path().join("sub/f3"), b"z").unwrap();
        std::os::unix::fs::symlink("f1", tree.path().join("ln")).unwrap();

        let h = harness(ExcludeFilter::empty(), Mappings::default());
        run_scan(&h, tree.path());

        assert_eq!(h.stats.files.load(Ordering::Relaxed), 3);
        assert_eq!(h.stats.dirs.load(Ordering::Relaxed), 1);
        assert_eq!(h.stats.links.load(Ordering::Relaxed), 1);
        assert_eq!(h.stats.errors.load(Ordering::Relaxed), 0);
        assert!(h.ctx.dispatcher.is_finished());
    }

    #[test]
    fn test_excluded_directory_is_never_entered() {
        let tree = tempdir().unwrap();
        std::fs::write(tree.path().join("keep"), b"x").unwrap();
        std::fs::create_dir(tree.path().join("skip")).unwrap();
        std::fs::write(tree.path().join("skip/hidden"), b"y").unwrap();

        let mut names = Vec::new();
        names.push("skip");
        let filter = {
            // build through the parser path used in production
            use std::io::Write;
            let mut f = tempfile::NamedTempFile::new().unwrap();
            for n in &names {
                writeln!(f, "{}", n).unwrap();
            }
            crate::input::parse_exclude_file(f.path()).unwrap()
        };

        let h = harness(filter, Mappings::default());
        run_scan(&h, tree.path());

        // the excluded directory itself and everything below it is invisible
        assert_eq!(h.stats.files.load(Ordering::Relaxed), 1);
        assert_eq!(h.stats.dirs.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_hardlinked_inode_counted_once() {
        let tree = tempdir().unwrap();
        std::fs::write(tree.path().join("x"), b"data").unwrap();
        std::fs::hard_link(tree.path().join("x"), tree.path().join("y")).unwrap();

        let h = harness(ExcludeFilter::empty(), Mappings::default());
        run_scan(&h, tree.path());

        assert_eq!(h.stats.files.load(Ordering::Relaxed), 1);
        assert_eq!(h.ctx.hardlinks.len(), 1);
    }

    #[test]
    fn test_dry_run_counts_intended_changes() {
        let tree = tempdir().unwrap();
        std::fs::write(tree.path().join("mine"), b"x").unwrap();

        use std::os::unix::fs::MetadataExt;
        let uid = std::fs::metadata(tree.path().join("mine")).unwrap().uid();

        let mut mappings = Mappings::default();
        mappings.uids.push(uid, uid.wrapping_add(1));

        let h = harness(ExcludeFilter::empty(), mappings);
        run_scan(&h, tree.path());

        assert_eq!(h.stats.changed.load(Ordering::Relaxed), 1);

        // dry run: ownership untouched
        let after = std::fs::metadata(tree.path().join("mine")).unwrap();
        assert_eq!(after.uid(), uid);
    }

    #[test]
    fn test_unreadable_root_warns_and_terminates() {
        let h = harness(ExcludeFilter::empty(), Mappings::default());
        run_scan(&h, Path::new("/no/such/tree"));

        assert_eq!(h.stats.errors.load(Ordering::Relaxed), 1);
        assert_eq!(h.stats.files.load(Ordering::Relaxed), 0);
        assert!(h.ctx.dispatcher.is_finished());
    }

    #[test]
    fn test_aggregate_stats_sums_workers() {
        let a = Arc::new(WorkerStats::default());
        let b = Arc::new(WorkerStats::default());
        a.record_file();
        a.record_dir();
        b.record_file();
        b.record_changed(2);

        let totals = aggregate_stats(&[a, b]);
        assert_eq!(totals.files, 2);
        assert_eq!(totals.dirs, 1);
        assert_eq!(totals.changed, 2);
    }

    #[test]
    fn test_deep_tree_breadth_first() {
        let tree = tempdir().unwrap();
        let mut path = PathBuf::from(tree.path());
        for depth in 0..5 {
            path.push(format!("d{depth}"));
            std::fs::create_dir(&path).unwrap();
            std::fs::write(path.join("leaf"), b"x").unwrap();
        }

        let mut h = harness(ExcludeFilter::empty(), Mappings::default());
        h.ctx.stack_mode = false;
        run_scan(&h, tree.path());

        assert_eq!(h.stats.dirs.load(Ordering::Relaxed), 5);
        assert_eq!(h.stats.files.load(Ordering::Relaxed), 5);
    }
}
