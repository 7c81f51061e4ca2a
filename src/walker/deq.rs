//! Double-ended work pool of subtree descriptors
//!
//! The same structure serves three roles: the two global pools owned by the
//! dispatcher and the private pool each worker traverses with. Used as a
//! stack (depth-first, the default) or a FIFO (breadth-first, `-q`).
//!
//! The splice operations move a worker's whole private backlog into a
//! global pool in one step while the dispatcher mutex is held; the donor
//! pool is left empty with its speed reset.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

/// A directory whose walk has not (yet) completed
///
/// Created when a root is seeded or a directory child is discovered;
/// dropped once its iteration finishes without deferral. `resume_pos`
/// holds the directory-stream position to continue from after a partial
/// visit (`None` means start from the beginning).
#[derive(Debug)]
pub struct Subtree {
    /// Absolute path of the directory
    pub path: PathBuf,

    /// Opaque resume position from `DirStream::tell`
    pub resume_pos: Option<libc::c_long>,

    /// Filesystem root this subtree was discovered under
    pub root: Arc<PathBuf>,
}

impl Subtree {
    /// Create a fresh descriptor starting at the beginning of the directory
    pub fn new(path: PathBuf, root: Arc<PathBuf>) -> Self {
        Self {
            path,
            resume_pos: None,
            root,
        }
    }
}

/// Ordered pool of subtree descriptors with an observed-speed attribute
///
/// `speed` is the directories-per-second most recently observed flowing
/// into this pool via a handover; the dispatcher compares and updates it
/// under its mutex.
#[derive(Debug, Default)]
pub struct Deq {
    items: VecDeque<Subtree>,

    /// Directories-per-second last observed on a handover into this pool
    pub speed: f64,
}

impl Deq {
    /// Create an empty pool with speed 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a single descriptor
    pub fn push_front(&mut self, elem: Subtree) {
        self.items.push_front(elem);
    }

    /// Append a single descriptor
    pub fn push_back(&mut self, elem: Subtree) {
        self.items.push_back(elem);
    }

    /// Remove and return the head descriptor
    pub fn pop_front(&mut self) -> Option<Subtree> {
        self.items.pop_front()
    }

    /// Move all of `other`'s descriptors to the front of this pool.
    ///
    /// Order within `other` is preserved; `other` is left empty with its
    /// speed reset to 0.
    pub fn splice_front(&mut self, other: &mut Deq) {
        if !other.items.is_empty() {
            other.items.append(&mut self.items);
            std::mem::swap(&mut self.items, &mut other.items);
        }
        other.speed = 0.0;
    }

    /// Move all of `other`'s descriptors to the back of this pool.
    ///
    /// Order within `other` is preserved; `other` is left empty with its
    /// speed reset to 0.
    pub fn splice_back(&mut self, other: &mut Deq) {
        self.items.append(&mut other.items);
        other.speed = 0.0;
    }

    /// Number of descriptors in the pool
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sub(name: &str) -> Subtree {
        Subtree::new(
            PathBuf::from(name),
            Arc::new(PathBuf::from("/root")),
        )
    }

    fn names(deq: &Deq) -> Vec<&Path> {
        deq.items.iter().map(|s| s.path.as_path()).collect()
    }

    #[test]
    fn test_push_pop_ordering() {
        let mut deq = Deq::new();
        deq.push_back(sub("/a"));
        deq.push_back(sub("/b"));
        deq.push_front(sub("/c"));

        assert_eq!(deq.len(), 3);
        assert_eq!(deq.pop_front().unwrap().path, Path::new("/c"));
        assert_eq!(deq.pop_front().unwrap().path, Path::new("/a"));
        assert_eq!(deq.pop_front().unwrap().path, Path::new("/b"));
        assert!(deq.pop_front().is_none());
        assert!(deq.is_empty());
    }

    #[test]
    fn test_splice_front_preserves_order() {
        let mut global = Deq::new();
        global.push_back(sub("/g1"));
        global.push_back(sub("/g2"));

        let mut local = Deq::new();
        local.push_back(sub("/l1"));
        local.push_back(sub("/l2"));
        local.speed = 42.0;

        global.splice_front(&mut local);

        assert_eq!(
            names(&global),
            vec![
                Path::new("/l1"),
                Path::new("/l2"),
                Path::new("/g1"),
                Path::new("/g2")
            ]
        );
        assert!(local.is_empty());
        assert_eq!(local.speed, 0.0);
    }

    #[test]
    fn test_splice_back_preserves_order() {
        let mut global = Deq::new();
        global.push_back(sub("/g1"));

        let mut local = Deq::new();
        local.push_back(sub("/l1"));
        local.push_back(sub("/l2"));
        local.speed = 7.5;

        global.splice_back(&mut local);

        assert_eq!(
            names(&global),
            vec![Path::new("/g1"), Path::new("/l1"), Path::new("/l2")]
        );
        assert!(local.is_empty());
        assert_eq!(local.speed, 0.0);
    }

    #[test]
    fn test_splice_empty_donor_resets_speed_only() {
        let mut global = Deq::new();
        global.push_back(sub("/g1"));

        let mut local = Deq::new();
        local.speed = 3.0;

        global.splice_front(&mut local);
        assert_eq!(global.len(), 1);
        assert_eq!(local.speed, 0.0);
    }
}
