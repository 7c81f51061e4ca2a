//! chuid - Fast Parallel UID/GID Rewriting
//!
//! A tool for rewriting ownership (UID and/or GID) on every regular file,
//! symbolic link and directory reachable beneath a set of filesystem roots,
//! according to a table of old -> new identifier mappings.
//!
//! # Features
//!
//! - **Parallel Traversal**: A fixed-size pool of worker threads, each
//!   walking independent subtrees with a private work pool.
//!
//! - **Cooperative Balancing**: Workers watch the busy ratio and hand their
//!   backlog to one of two global pools when too many peers are idle; the
//!   pools are split by observed processing speed so fast sources (local
//!   disks) are not starved behind slow ones (network mounts).
//!
//! - **Hardlink Safe**: Multiply-linked files are owner-changed exactly
//!   once per scan, tracked by a shared (device, inode) set.
//!
//! - **Resumable Iteration**: A directory cut short by a handover carries
//!   an opaque stream position, so whichever worker picks it up continues
//!   exactly after the last processed entry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                                │
//! │   ┌──────────────────┐          ┌──────────────────┐            │
//! │   │    fast pool     │          │    slow pool     │            │
//! │   │  (speed-tagged)  │          │  (speed-tagged)  │            │
//! │   └────────┬─────────┘          └────────┬─────────┘            │
//! │            │     weighted extraction     │                      │
//! │            │   ceil(fast.speed/slow.speed)                      │
//! │            ▼                             ▼                      │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │     │
//! │  │ private │  │ private │  │ private │         │ private │     │
//! │  │  pool   │  │  pool   │  │  pool   │         │  pool   │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       │            │            │                    │          │
//! │       └────────────┴─────┬──────┴────────────────────┘          │
//! │                          │ handover on idle peers               │
//! │                          ▼                                      │
//! │            back to the fast or slow pool,                       │
//! │            chosen by observed dirs/second                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Remap uid 1000 to 2000 below /data and /srv
//! echo 'u:1000 2000' > idmap.txt
//! printf '/data\n/srv\n' > roots.txt
//! chuid -i idmap.txt -d roots.txt -l /var/log/chuid
//!
//! # Dry run with 40 workers and periodic statistics
//! chuid -i idmap.txt -d roots.txt -l /tmp -t 40 -s 10 -n
//! ```

pub mod config;
pub mod error;
pub mod input;
pub mod logfile;
pub mod owner;
pub mod progress;
pub mod walker;

pub use config::{CliArgs, ScanConfig};
pub use error::{ChuidError, Result};
pub use walker::{ScanCoordinator, ScanResult};
