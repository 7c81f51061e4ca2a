//! Error types for chuid
//!
//! This module defines the error hierarchy covering:
//! - Configuration and CLI errors
//! - Input-file parsing errors (mapping, roots, exclusions)
//! - Worker thread errors
//! - Log-file writer errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Startup errors carry the underlying errno so the process can exit
//!   with it; per-entry errors are logged as warnings and never bubble up

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the chuid application
#[derive(Error, Debug)]
pub enum ChuidError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input-file errors
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (log file creation, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Scan interrupted by signal")]
    Interrupted,

    /// Log writer channel closed unexpectedly
    #[error("Log writer channel closed unexpectedly")]
    LogChannelClosed,
}

impl ChuidError {
    /// Process exit code for this error.
    ///
    /// Startup filesystem errors exit with the underlying errno; everything
    /// else (configuration mistakes, interruption) exits with the generic
    /// failure status.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChuidError::Io(e) => e.raw_os_error().unwrap_or(1),
            ChuidError::Input(InputError::OpenFailed { source, .. })
            | ChuidError::Input(InputError::NoValidRoots { source }) => {
                source.raw_os_error().unwrap_or(1)
            }
            _ => 1,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Busy threshold outside (0, 1]
    #[error("Invalid busy threshold {value}: must be in (0, 1]")]
    InvalidBusyThreshold { value: f64 },

    /// Progress interval of zero
    #[error("Invalid progress interval: must be at least 1 second")]
    InvalidInterval,

    /// Log directory missing or not a directory
    #[error("Invalid log directory '{path}': {reason}")]
    InvalidLogDir { path: PathBuf, reason: String },
}

/// Input-file errors (mapping list, roots list, exclusion list)
#[derive(Error, Debug)]
pub enum InputError {
    /// Could not open an input file
    #[error("Failed to open '{path}': {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Roots file contained no entries
    #[error("No file systems to work on")]
    NoRoots,

    /// Every root failed its initial stat; carries the last stat error so
    /// the process can exit with its errno
    #[error("No valid file systems to work on: {source}")]
    NoValidRoots {
        #[source]
        source: std::io::Error,
    },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker initialization failed
    #[error("Failed to start worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked")]
    Panicked { id: usize },
}

/// Result type alias for ChuidError
pub type Result<T> = std::result::Result<T, ChuidError>;
