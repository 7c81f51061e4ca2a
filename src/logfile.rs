//! Scan log writer
//!
//! Every run produces a `chuid_log` file inside the operator-supplied log
//! directory, recording applied ownership changes and per-entry warnings.
//! Lines have the shape
//!
//! ```text
//! Sat Aug 02 14:31:11 2026 INFO: /data/f (FILE): 1000 (alice), uid will be changed to 2000 (bob)
//! ```
//!
//! A dedicated writer thread receives messages over a bounded channel so
//! worker threads never contend on file I/O. Messages are timestamped at
//! submission time, not at write time.

use crate::error::{ChuidError, Result};
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};
use tracing::error;

/// Name of the log file created inside the log directory
pub const LOG_FILE_NAME: &str = "chuid_log";

/// Channel capacity before submitters block
const LOG_CHANNEL_CAPACITY: usize = 4096;

/// Log-line severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Warning => f.write_str("WARNING"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// Message types sent to the writer thread
enum LogMessage {
    /// A timestamped log line
    Line {
        stamp: DateTime<Local>,
        severity: Severity,
        text: String,
    },

    /// Flush and stop the writer
    Shutdown,
}

/// Handle for submitting log lines (clone one per worker)
#[derive(Clone)]
pub struct LogHandle {
    sender: Sender<LogMessage>,
}

impl LogHandle {
    /// Submit a line at the given severity
    pub fn log(&self, severity: Severity, text: impl Into<String>) {
        let msg = LogMessage::Line {
            stamp: Local::now(),
            severity,
            text: text.into(),
        };
        if self.sender.send(msg).is_err() {
            // Writer already gone; nothing left to do but note it on stderr.
            error!("Log writer is gone, line dropped");
        }
    }

    /// Submit an INFO line
    pub fn info(&self, text: impl Into<String>) {
        self.log(Severity::Info, text);
    }

    /// Submit a WARNING line
    pub fn warning(&self, text: impl Into<String>) {
        self.log(Severity::Warning, text);
    }

    /// Submit an ERROR line
    pub fn error(&self, text: impl Into<String>) {
        self.log(Severity::Error, text);
    }
}

/// Log writer running in its own thread
#[derive(Debug)]
pub struct LogWriter {
    sender: Sender<LogMessage>,
    thread: Option<JoinHandle<std::io::Result<()>>>,
}

impl LogWriter {
    /// Create `chuid_log` inside `log_dir` and start the writer thread.
    ///
    /// Fails with the underlying I/O error if the file cannot be created;
    /// startup aborts with that errno.
    pub fn create(log_dir: &Path) -> Result<Self> {
        let path = log_dir.join(LOG_FILE_NAME);
        let file = File::create(&path)?;

        let (sender, receiver) = bounded(LOG_CHANNEL_CAPACITY);

        let thread = thread::Builder::new()
            .name("chuid-log".into())
            .spawn(move || writer_loop(file, receiver))
            .map_err(ChuidError::Io)?;

        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    /// Get a submission handle
    pub fn handle(&self) -> LogHandle {
        LogHandle {
            sender: self.sender.clone(),
        }
    }

    /// Flush pending lines and stop the writer thread
    pub fn finish(mut self) -> Result<()> {
        self.sender
            .send(LogMessage::Shutdown)
            .map_err(|_| ChuidError::LogChannelClosed)?;
        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(io_result) => io_result.map_err(ChuidError::Io)?,
                Err(_) => return Err(ChuidError::LogChannelClosed),
            }
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        // finish() already joined; otherwise flush on a best-effort basis
        let _ = self.sender.send(LogMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn writer_loop(file: File, receiver: Receiver<LogMessage>) -> std::io::Result<()> {
    let mut out = BufWriter::new(file);

    while let Ok(msg) = receiver.recv() {
        match msg {
            LogMessage::Line {
                stamp,
                severity,
                text,
            } => {
                writeln!(
                    out,
                    "{} {}: {}",
                    stamp.format("%a %b %d %H:%M:%S %Y"),
                    severity,
                    text
                )?;
            }
            LogMessage::Shutdown => break,
        }
    }

    out.flush()
}
