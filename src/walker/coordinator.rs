//! Scan coordinator - orchestrates the parallel ownership scan
//!
//! The coordinator is responsible for:
//! - Building the dispatcher and the shared read-only context
//! - Seeding the fast pool with the filesystem roots
//! - Spawning and joining the workers (and the optional reporter thread)
//! - Final statistics

use crate::config::ScanConfig;
use crate::error::{InputError, Result};
use crate::input::{ExcludeFilter, Mappings};
use crate::logfile::LogHandle;
use crate::owner::OwnershipChanger;
use crate::progress;
use crate::walker::deq::Subtree;
use crate::walker::dispatcher::Dispatcher;
use crate::walker::hardlink::HardlinkSet;
use crate::walker::worker::{aggregate_stats, WalkTotals, Worker, WorkerContext, WorkerStats};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of a completed scan
#[derive(Debug)]
pub struct ScanResult {
    /// Aggregated per-entry counters
    pub totals: WalkTotals,

    /// Number of roots that passed their initial stat and were scanned
    pub roots_scanned: usize,

    /// Wall-clock time of the scan
    pub duration: Duration,

    /// Whether the scan ran to completion (vs. was interrupted by signal)
    pub completed: bool,
}

/// Coordinates the parallel scan
pub struct ScanCoordinator {
    config: Arc<ScanConfig>,
    dispatcher: Arc<Dispatcher>,
    hardlinks: Arc<HardlinkSet>,
    excludes: Arc<ExcludeFilter>,
    changer: Arc<OwnershipChanger>,
    log: LogHandle,
    workers: Vec<Worker>,
    roots_seeded: usize,
}

impl ScanCoordinator {
    /// Create a coordinator from validated configuration and loaded tables
    pub fn new(
        config: ScanConfig,
        mappings: Mappings,
        excludes: ExcludeFilter,
        log: LogHandle,
    ) -> Self {
        let config = Arc::new(config);
        let dispatcher = Arc::new(Dispatcher::new(
            config.worker_count,
            config.busy_threshold,
            config.dual_pool,
            config.stack_mode,
        ));
        let changer = Arc::new(OwnershipChanger::new(
            Arc::new(mappings),
            config.dry_run,
            log.clone(),
        ));

        Self {
            config,
            dispatcher,
            hardlinks: Arc::new(HardlinkSet::new()),
            excludes: Arc::new(excludes),
            changer,
            log,
            workers: Vec::new(),
            roots_seeded: 0,
        }
    }

    /// Get the dispatcher (for signal handlers)
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Stat each root and seed the survivors into the fast pool.
    ///
    /// Roots that fail their stat are logged as WARNING and skipped; a scan
    /// with zero valid roots is a startup error.
    pub fn seed_roots(&mut self, roots: &[PathBuf]) -> Result<usize> {
        let mut seeded = 0;
        let mut last_error: Option<std::io::Error> = None;
        for root in roots {
            match std::fs::symlink_metadata(root) {
                Ok(_) => {
                    self.dispatcher
                        .seed(Subtree::new(root.clone(), Arc::new(root.clone())));
                    seeded += 1;
                }
                Err(e) => {
                    self.log
                        .warning(format!("couldn't stat <{}>: {}", root.display(), e));
                    last_error = Some(e);
                }
            }
        }
        if seeded == 0 {
            // the last stat failure supplies the exit errno
            let source = last_error
                .unwrap_or_else(|| std::io::Error::from_raw_os_error(libc::ENOENT));
            return Err(InputError::NoValidRoots { source }.into());
        }
        self.roots_seeded = seeded;
        Ok(seeded)
    }

    /// Run the scan to completion (or interruption)
    pub fn run(mut self) -> Result<ScanResult> {
        let start = Instant::now();

        info!(
            workers = self.config.worker_count,
            roots = self.roots_seeded,
            dual_pool = self.config.dual_pool,
            dry_run = self.config.dry_run,
            "Starting scan"
        );

        self.spawn_workers()?;

        let stats: Vec<Arc<WorkerStats>> = self.workers.iter().map(|w| w.stats()).collect();

        let reporter = match self.config.progress_interval {
            Some(interval) => {
                match progress::spawn_reporter(
                    Arc::clone(&self.dispatcher),
                    stats.clone(),
                    interval,
                ) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!(error = %e, "Statistics thread did not start");
                        None
                    }
                }
            }
            None => None,
        };

        let workers = std::mem::take(&mut self.workers);
        for worker in workers {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        if let Some(handle) = reporter {
            let _ = handle.join();
        }

        let totals = aggregate_stats(&stats);
        let completed = !self.dispatcher.was_interrupted();
        let duration = start.elapsed();

        info!(
            files = totals.files,
            dirs = totals.dirs,
            links = totals.links,
            changed = totals.changed,
            errors = totals.errors,
            duration_secs = duration.as_secs(),
            completed,
            "Scan finished"
        );

        Ok(ScanResult {
            totals,
            roots_scanned: self.roots_seeded,
            duration,
            completed,
        })
    }

    /// Spawn the fixed worker pool
    fn spawn_workers(&mut self) -> Result<()> {
        for id in 0..self.config.worker_count {
            let ctx = WorkerContext {
                dispatcher: Arc::clone(&self.dispatcher),
                excludes: Arc::clone(&self.excludes),
                hardlinks: Arc::clone(&self.hardlinks),
                changer: Arc::clone(&self.changer),
                log: self.log.clone(),
                stack_mode: self.config.stack_mode,
                dual_pool: self.config.dual_pool,
            };
            self.workers.push(Worker::spawn(id, ctx)?);
        }
        info!(count = self.workers.len(), "Workers spawned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::LogWriter;
    use tempfile::{tempdir, TempDir};

    fn test_config(log_dir: &TempDir, workers: usize, busy_threshold: f64) -> ScanConfig {
        ScanConfig {
            mapping_file: PathBuf::from("unused"),
            roots_file: PathBuf::from("unused"),
            exclude_file: None,
            log_dir: log_dir.path().to_path_buf(),
            worker_count: workers,
            busy_threshold,
            progress_interval: None,
            dual_pool: true,
            stack_mode: true,
            dry_run: true,
            verbose: false,
        }
    }

    fn build_tree(files_per_dir: usize, dirs: usize) -> TempDir {
        let tree = tempdir().unwrap();
        for d in 0..dirs {
            let dir = tree.path().join(format!("dir{d}"));
            std::fs::create_dir(&dir).unwrap();
            for f in 0..files_per_dir {
                std::fs::write(dir.join(format!("file{f}")), b"x").unwrap();
            }
        }
        tree
    }

    #[test]
    fn test_full_scan_counts_everything() {
        let tree = build_tree(10, 8);
        let log_dir = tempdir().unwrap();
        let writer = LogWriter::create(log_dir.path()).unwrap();

        let mut coordinator = ScanCoordinator::new(
            test_config(&log_dir, 4, 0.9),
            Mappings::default(),
            ExcludeFilter::empty(),
            writer.handle(),
        );
        coordinator.seed_roots(&[tree.path().to_path_buf()]).unwrap();
        let result = coordinator.run().unwrap();

        assert!(result.completed);
        assert_eq!(result.totals.dirs, 8);
        assert_eq!(result.totals.files, 80);
        assert_eq!(result.totals.errors, 0);
        writer.finish().unwrap();
    }

    #[test]
    fn test_handover_pressure_visits_each_entry_once() {
        // threshold 1.0: the probe fires whenever any worker is idle, so the
        // scan is dominated by handover and resume-cursor traffic
        let tree = build_tree(5, 20);
        let log_dir = tempdir().unwrap();
        let writer = LogWriter::create(log_dir.path()).unwrap();

        let mut coordinator = ScanCoordinator::new(
            test_config(&log_dir, 4, 1.0),
            Mappings::default(),
            ExcludeFilter::empty(),
            writer.handle(),
        );
        coordinator.seed_roots(&[tree.path().to_path_buf()]).unwrap();
        let result = coordinator.run().unwrap();

        assert!(result.completed);
        assert_eq!(result.totals.dirs, 20);
        assert_eq!(result.totals.files, 100);
        writer.finish().unwrap();
    }

    #[test]
    fn test_invalid_roots_are_skipped() {
        let tree = build_tree(1, 1);
        let log_dir = tempdir().unwrap();
        let writer = LogWriter::create(log_dir.path()).unwrap();

        let mut coordinator = ScanCoordinator::new(
            test_config(&log_dir, 2, 0.9),
            Mappings::default(),
            ExcludeFilter::empty(),
            writer.handle(),
        );
        let seeded = coordinator
            .seed_roots(&[
                PathBuf::from("/no/such/root"),
                tree.path().to_path_buf(),
            ])
            .unwrap();
        assert_eq!(seeded, 1);

        let result = coordinator.run().unwrap();
        assert_eq!(result.totals.files, 1);
        writer.finish().unwrap();
    }

    #[test]
    fn test_no_valid_roots_is_fatal() {
        let log_dir = tempdir().unwrap();
        let writer = LogWriter::create(log_dir.path()).unwrap();

        let mut coordinator = ScanCoordinator::new(
            test_config(&log_dir, 2, 0.9),
            Mappings::default(),
            ExcludeFilter::empty(),
            writer.handle(),
        );
        let err = coordinator
            .seed_roots(&[PathBuf::from("/no/such/root")])
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ChuidError::Input(InputError::NoValidRoots { .. })
        ));
        // the failed stat's errno drives the exit code
        assert_eq!(err.exit_code(), libc::ENOENT);
        writer.finish().unwrap();
    }

    #[test]
    fn test_shutdown_before_run_reports_interrupted() {
        let tree = build_tree(2, 2);
        let log_dir = tempdir().unwrap();
        let writer = LogWriter::create(log_dir.path()).unwrap();

        let mut coordinator = ScanCoordinator::new(
            test_config(&log_dir, 2, 0.9),
            Mappings::default(),
            ExcludeFilter::empty(),
            writer.handle(),
        );
        coordinator.seed_roots(&[tree.path().to_path_buf()]).unwrap();
        coordinator.dispatcher().request_shutdown();

        let result = coordinator.run().unwrap();
        assert!(!result.completed);
        writer.finish().unwrap();
    }
}
