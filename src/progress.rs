//! Progress reporting for the ownership scan
//!
//! With `-s <sec>` a reporter thread prints one statistics row per interval:
//! worker totals, busy count, cumulative files and per-second rates, plus
//! the global pool lengths and speeds. Counters are read relaxed; the pool
//! snapshot takes the dispatcher mutex briefly.
//!
//! Also provides the styled startup header and final summary. All of this
//! goes to stderr: stdout is reserved for dry-run report lines.

use crate::walker::dispatcher::Dispatcher;
use crate::walker::worker::{aggregate_stats, WalkTotals, WorkerStats};
use console::style;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Granularity of the completion check between interval prints
const POLL_STEP: Duration = Duration::from_millis(200);

/// Spawn the reporter thread
pub fn spawn_reporter(
    dispatcher: Arc<Dispatcher>,
    stats: Vec<Arc<WorkerStats>>,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("chuid-stats".into())
        .spawn(move || reporter_loop(&dispatcher, &stats, interval))
}

fn reporter_loop(dispatcher: &Dispatcher, stats: &[Arc<WorkerStats>], interval: Duration) {
    if dispatcher.dual_pool() {
        eprintln!(
            "\n{}\n",
            style("Threads  busy      files   files/s  dirs/s  links/s  fast-q  speed  slow-q  speed")
                .bold()
        );
    } else {
        eprintln!(
            "\n{}\n",
            style("Threads  busy      files   files/s  dirs/s  links/s   queue").bold()
        );
    }

    let mut prev = WalkTotals::default();
    while sleep_interval(dispatcher, interval) {
        let totals = aggregate_stats(stats);
        let secs = interval.as_secs_f64();
        let file_rate = (totals.files - prev.files) as f64 / secs;
        let dir_rate = (totals.dirs - prev.dirs) as f64 / secs;
        let link_rate = (totals.links - prev.links) as f64 / secs;
        let snap = dispatcher.snapshot();

        if dispatcher.dual_pool() {
            eprintln!(
                "{:7} {:5} {:10} {:9.0} {:7.0} {:8.0} {:7} {:6.1} {:7} {:6.1}",
                dispatcher.worker_total(),
                dispatcher.busy_count(),
                totals.files,
                file_rate,
                dir_rate,
                link_rate,
                snap.fast_len,
                snap.fast_speed,
                snap.slow_len,
                snap.slow_speed,
            );
        } else {
            eprintln!(
                "{:7} {:5} {:10} {:9.0} {:7.0} {:8.0} {:7}",
                dispatcher.worker_total(),
                dispatcher.busy_count(),
                totals.files,
                file_rate,
                dir_rate,
                link_rate,
                snap.fast_len,
            );
        }

        prev = totals;
    }
    eprintln!();
}

/// Sleep for one interval in small steps; false once the scan has finished
fn sleep_interval(dispatcher: &Dispatcher, interval: Duration) -> bool {
    let mut slept = Duration::ZERO;
    while slept < interval {
        if dispatcher.is_finished() {
            return false;
        }
        let step = POLL_STEP.min(interval - slept);
        thread::sleep(step);
        slept += step;
    }
    !dispatcher.is_finished()
}

/// Print a header at the start of the scan
pub fn print_header(workers: usize, roots: usize, log_path: &str, dry_run: bool) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("chuid").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Workers:").bold(), workers);
    eprintln!("  {} {}", style("Roots:").bold(), roots);
    eprintln!("  {} {}", style("Log:").bold(), log_path);
    if dry_run {
        eprintln!("  {} {}", style("Mode:").bold(), style("dry run").yellow());
    }
    eprintln!();
}

/// Print a summary of the scan results
pub fn print_summary(totals: &WalkTotals, duration: Duration, completed: bool) {
    let duration_secs = duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        totals.files as f64 / duration_secs
    } else {
        0.0
    };

    eprintln!();
    if completed {
        eprintln!("{}", style("Scan Complete").green().bold());
    } else {
        eprintln!("{}", style("Scan Interrupted").yellow().bold());
    }
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!(
        "  {} {}",
        style("Files:").bold(),
        format_number(totals.files)
    );
    eprintln!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(totals.dirs)
    );
    eprintln!(
        "  {} {}",
        style("Symlinks:").bold(),
        format_number(totals.links)
    );
    eprintln!(
        "  {} {}",
        style("Others:").bold(),
        format_number(totals.others)
    );
    eprintln!(
        "  {} {}",
        style("Changes:").bold(),
        format_number(totals.changed)
    );
    if totals.errors > 0 {
        eprintln!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(totals.errors)
        );
    }
    eprintln!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    eprintln!();
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}
