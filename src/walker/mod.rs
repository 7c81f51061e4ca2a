//! The parallel traversal engine
//!
//! Submodules, leaves first:
//! - [`deq`]: the double-ended work pool of subtree descriptors
//! - [`dirstream`]: directory iteration with tell/seek resume support
//! - [`hardlink`]: the (device, inode) dedup set
//! - [`dispatcher`]: global fast/slow pools, weighted extraction, termination
//! - [`worker`]: the per-thread walk with idleness-driven handover
//! - [`coordinator`]: seeding, spawning, joining, final statistics

pub mod coordinator;
pub mod deq;
pub mod dirstream;
pub mod dispatcher;
pub mod hardlink;
pub mod worker;

pub use coordinator::{ScanCoordinator, ScanResult};
pub use deq::{Deq, Subtree};
pub use dirstream::DirStream;
pub use dispatcher::{Dispatcher, PoolSnapshot};
pub use hardlink::{HardlinkSet, Mark};
pub use worker::{WalkTotals, Worker, WorkerContext, WorkerStats};
