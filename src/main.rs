//! chuid - Fast Parallel UID/GID Rewriting
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use chuid::config::{CliArgs, ScanConfig};
use chuid::error::ChuidError;
use chuid::input::{self, ExcludeFilter};
use chuid::logfile::{LogWriter, LOG_FILE_NAME};
use chuid::progress::{print_header, print_summary};
use chuid::walker::ScanCoordinator;
use clap::Parser;
use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::process::ExitCode;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        // interrupted by signal
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<ChuidError>())
                .map(|ce| ce.exit_code())
                .unwrap_or(1);
            ExitCode::from(code.clamp(1, 255) as u8)
        }
    }
}

fn run(args: CliArgs) -> Result<bool> {
    let config = ScanConfig::from_args(args).map_err(ChuidError::from)?;

    // The log file is opened before anything else that can fail at runtime,
    // so per-entry warnings always have somewhere to go.
    let log_writer = LogWriter::create(&config.log_dir)?;
    let log = log_writer.handle();
    log.info("chuid started");

    let mappings = input::parse_mapping_file(&config.mapping_file).map_err(ChuidError::from)?;
    let roots = input::parse_roots_file(&config.roots_file).map_err(ChuidError::from)?;
    let excludes = match &config.exclude_file {
        Some(path) => input::parse_exclude_file(path).map_err(ChuidError::from)?,
        None => ExcludeFilter::empty(),
    };

    if config.verbose {
        for root in &roots {
            info!(root = %root.display(), "Scan root");
        }
        for name in excludes.iter() {
            info!(name = %name.to_string_lossy(), "Excluded");
        }
        for pair in mappings.uids.iter() {
            info!(old = pair.old, new = pair.new, "UID mapping");
        }
        for pair in mappings.gids.iter() {
            info!(old = pair.old, new = pair.new, "GID mapping");
        }
    }

    print_header(
        config.worker_count,
        roots.len(),
        &config.log_dir.join(LOG_FILE_NAME).display().to_string(),
        config.dry_run,
    );

    let mut coordinator = ScanCoordinator::new(config, mappings, excludes, log.clone());
    coordinator.seed_roots(&roots)?;

    // Signal watcher: flag the dispatcher on SIGINT/SIGTERM/SIGQUIT; workers
    // finish their current walk and exit, main falls through to the summary
    // with failure status.
    let caught_signal = Arc::new(AtomicI32::new(0));
    let dispatcher = coordinator.dispatcher();
    let signal_log = log.clone();
    let caught = Arc::clone(&caught_signal);
    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGQUIT]).context("Failed to register signal handlers")?;
    thread::Builder::new()
        .name("chuid-signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                caught.store(signal, Ordering::SeqCst);
                let name = signal_name(signal);
                eprintln!("\nGot signal {name}, shutting down gracefully...");
                signal_log.info(format!("got Signal <{name}>"));
                dispatcher.request_shutdown();
            }
        })
        .context("Failed to start signal watcher")?;

    let result = coordinator.run()?;
    print_summary(&result.totals, result.duration, result.completed);

    if result.completed {
        log.info("Scan successfully completed");
    } else {
        let name = signal_name(caught_signal.load(Ordering::SeqCst));
        log.info(format!("scan terminated by Signal <{name}>"));
    }
    log_writer.finish()?;

    Ok(result.completed)
}

fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGQUIT => "SIGQUIT",
        _ => "unknown",
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("chuid=info,warn")
    } else {
        EnvFilter::new("chuid=warn")
    };

    // stderr only: stdout is reserved for dry-run report lines
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
