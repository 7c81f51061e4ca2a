//! Hardlink deduplication across the whole scan
//!
//! A regular file with a link count above one may be reached through any
//! number of directory entries, possibly by different workers at the same
//! time. Each such file must be owner-changed at most once, so every worker
//! consults this shared set before touching it: the first caller to mark a
//! given (device, inode) pair wins.

use dashmap::DashSet;

/// Identity of a file independent of any particular path to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeKey {
    pub dev: u64,
    pub ino: u64,
}

/// Outcome of marking an inode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// First sighting of this (device, inode) pair; the caller owns the change
    Fresh,

    /// Already marked by some worker; skip the change
    Seen,
}

/// Concurrency-safe set of (device, inode) pairs
///
/// `mark` is a single atomic test-and-insert: a given pair transitions
/// absent to present exactly once per scan, no matter how many workers race
/// on it.
#[derive(Debug, Default)]
pub struct HardlinkSet {
    seen: DashSet<InodeKey>,
}

impl HardlinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a pair, reporting whether this caller was first
    pub fn mark(&self, dev: u64, ino: u64) -> Mark {
        if self.seen.insert(InodeKey { dev, ino }) {
            Mark::Fresh
        } else {
            Mark::Seen
        }
    }

    /// Number of distinct pairs marked so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check whether nothing has been marked yet
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
