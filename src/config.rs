//! Configuration types for chuid
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation and resource-limit clamping

use crate::error::ConfigError;
use clap::Parser;
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Hard ceiling on the worker count
pub const MAX_WORKERS: usize = 256;

/// File descriptors reserved beyond one per worker (log file, inputs, spare)
const OPEN_FILES_OFFSET: u64 = 5;

/// Default worker count
const DEFAULT_WORKERS: usize = 20;

/// Fast parallel UID/GID rewriting across filesystem trees
#[derive(Parser, Debug, Clone)]
#[command(
    name = "chuid",
    version,
    about = "Changes given uids to new uids (optionally new gids, too) below a set of directories",
    after_help = "EXAMPLES:\n    \
        chuid -i idmap.txt -d roots.txt -l /var/log/chuid\n    \
        chuid -i idmap.txt -d roots.txt -e exclude.txt -l /tmp -t 40 -b 0.8\n    \
        chuid -i idmap.txt -d roots.txt -l /tmp -n    # dry run\n\n\
        Mapping file lines: 'u:<old-uid> <new-uid>' or 'g:<old-gid> <new-gid>'"
)]
pub struct CliArgs {
    /// Input file containing old-uid new-uid respectively old-gid new-gid
    #[arg(short = 'i', value_name = "FILE")]
    pub mapping_file: PathBuf,

    /// File containing root directories where changes should take place
    #[arg(short = 'd', value_name = "FILE")]
    pub roots_file: PathBuf,

    /// File containing directories/files to exclude from changes
    #[arg(short = 'e', value_name = "FILE")]
    pub exclude_file: Option<PathBuf>,

    /// Log directory which will contain the log output
    #[arg(short = 'l', value_name = "DIR")]
    pub log_dir: PathBuf,

    /// Number of worker threads
    #[arg(short = 't', value_name = "NUM", default_value_t = DEFAULT_WORKERS)]
    pub threads: usize,

    /// Busy threshold for working threads out of allowed number of threads
    #[arg(short = 'b', value_name = "RATIO", default_value_t = 0.9)]
    pub busy_threshold: f64,

    /// Print statistics continuously every <SECS> seconds
    #[arg(short = 's', value_name = "SECS")]
    pub interval: Option<u64>,

    /// One-queue version (disable the fast/slow pool split)
    #[arg(short = 'o')]
    pub single_pool: bool,

    /// Queueing instead of stack version (breadth-first traversal)
    #[arg(short = 'q')]
    pub queue_mode: bool,

    /// Dry run - shows files to be changed
    #[arg(short = 'n')]
    pub dry_run: bool,

    /// Verbose mode
    #[arg(short = 'v')]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// UID/GID mapping file path
    pub mapping_file: PathBuf,

    /// Filesystem-roots file path
    pub roots_file: PathBuf,

    /// Optional exclusion file path
    pub exclude_file: Option<PathBuf>,

    /// Directory receiving the chuid_log file
    pub log_dir: PathBuf,

    /// Worker thread count after clamping
    pub worker_count: usize,

    /// Busy-ratio threshold driving handover, in (0, 1]
    pub busy_threshold: f64,

    /// Progress-print interval; enables the reporter thread
    pub progress_interval: Option<Duration>,

    /// Fast/slow pool split active
    pub dual_pool: bool,

    /// Depth-first private pools when true
    pub stack_mode: bool,

    /// Report instead of change
    pub dry_run: bool,

    /// Verbose startup output
    pub verbose: bool,
}

impl ScanConfig {
    /// Create and validate configuration from CLI arguments.
    ///
    /// Raises the open-files limit as far as permitted, then clamps the
    /// worker count so that every worker can hold a directory stream open
    /// with descriptors to spare.
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.busy_threshold <= 0.0 || args.busy_threshold > 1.0 {
            return Err(ConfigError::InvalidBusyThreshold {
                value: args.busy_threshold,
            });
        }

        if args.interval == Some(0) {
            return Err(ConfigError::InvalidInterval);
        }

        if args.threads == 0 || args.threads > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.threads,
                max: MAX_WORKERS,
            });
        }

        match std::fs::metadata(&args.log_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ConfigError::InvalidLogDir {
                    path: args.log_dir,
                    reason: "not a directory".into(),
                })
            }
            Err(e) => {
                return Err(ConfigError::InvalidLogDir {
                    path: args.log_dir,
                    reason: e.to_string(),
                })
            }
        }

        let max_openfiles = raise_open_files_limit();
        let mut worker_count = args.threads;
        if max_openfiles.saturating_sub(worker_count as u64) < OPEN_FILES_OFFSET {
            worker_count = max_openfiles.saturating_sub(OPEN_FILES_OFFSET).max(1) as usize;
            warn!(
                limit = max_openfiles,
                workers = worker_count,
                "Worker count reduced to fit the file descriptor limit"
            );
        }

        Ok(Self {
            mapping_file: args.mapping_file,
            roots_file: args.roots_file,
            exclude_file: args.exclude_file,
            log_dir: args.log_dir,
            worker_count,
            busy_threshold: args.busy_threshold,
            progress_interval: args.interval.map(Duration::from_secs),
            dual_pool: !args.single_pool,
            stack_mode: !args.queue_mode,
            dry_run: args.dry_run,
            verbose: args.verbose,
        })
    }
}

/// Raise RLIMIT_NOFILE to its hard limit and return the resulting soft limit
fn raise_open_files_limit() -> u64 {
    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, hard)) => {
            if soft < hard {
                if let Err(e) = setrlimit(Resource::RLIMIT_NOFILE, hard, hard) {
                    warn!(error = %e, "Could not raise the open-files limit");
                    return soft;
                }
                info!(limit = hard, "Open-files limit raised");
                return hard;
            }
            soft
        }
        Err(e) => {
            warn!(error = %e, "Could not read the open-files limit");
            1024
        }
    }
}
