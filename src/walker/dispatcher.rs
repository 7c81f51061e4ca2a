//! Global pool coordination and the termination protocol
//!
//! The dispatcher owns the two global work pools (fast and slow), the
//! busy-worker count, the completion flag and the weighted extraction
//! counter, all guarded by a single mutex with one condition variable.
//!
//! Workers interact through four entry points:
//! - `acquire`: block until a subtree is available or the scan is finished
//! - `release`: signal the end of a walk; the releasing worker that finds
//!   the pools empty and itself the last busy one declares completion
//! - `hand_over`: splice a private backlog into the fast or slow pool,
//!   chosen by comparing the worker's observed speed against the average
//!   of the two pool speeds
//! - `too_many_idle`: the unsynchronized idleness probe driving handover
//!
//! Extraction interleaves the two pools so the pool observed to supply
//! faster subtrees contributes proportionally more descriptors: a budget
//! counter is decremented per fast extraction and recomputed from
//! `ceil(fast.speed / slow.speed)` whenever it reaches zero or the fast
//! pool runs dry.

use crate::walker::deq::{Deq, Subtree};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// State guarded by the dispatcher mutex
struct PoolState {
    fast: Deq,
    slow: Deq,
    busy: usize,
    finished: bool,
    fast_budget: u64,
}

/// Point-in-time view of the pools, for the progress reporter
#[derive(Debug, Clone, Copy)]
pub struct PoolSnapshot {
    pub fast_len: usize,
    pub fast_speed: f64,
    pub slow_len: usize,
    pub slow_speed: f64,
}

/// Coordinates work distribution across the worker pool
pub struct Dispatcher {
    state: Mutex<PoolState>,
    available: Condvar,

    /// Mirror of the guarded busy count, written under the mutex and read
    /// relaxed by the idleness probe. The probe is a heuristic; staleness
    /// is bounded by one walk step.
    busy_now: AtomicUsize,

    /// Mirror of the guarded completion flag for lock-free polling
    finished_now: AtomicBool,

    /// Set when shutdown was requested by a signal rather than reached
    /// through the termination protocol
    interrupted: AtomicBool,

    workers: usize,
    busy_threshold: f64,
    dual_pool: bool,
    stack_mode: bool,
}

impl Dispatcher {
    /// Create a dispatcher for a fixed pool of `workers` threads.
    ///
    /// `dual_pool` enables the fast/slow split; `stack_mode` selects the
    /// splice end used by handover (front for depth-first, back for
    /// breadth-first).
    pub fn new(workers: usize, busy_threshold: f64, dual_pool: bool, stack_mode: bool) -> Self {
        Self {
            state: Mutex::new(PoolState {
                fast: Deq::new(),
                slow: Deq::new(),
                busy: 0,
                finished: false,
                fast_budget: 0,
            }),
            available: Condvar::new(),
            busy_now: AtomicUsize::new(0),
            finished_now: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            workers,
            busy_threshold,
            dual_pool,
            stack_mode,
        }
    }

    /// Append a root subtree to the fast pool (called before workers start)
    pub fn seed(&self, sub: Subtree) {
        let mut state = self.state.lock().unwrap();
        state.fast.push_back(sub);
        drop(state);
        self.available.notify_one();
    }

    /// Block until a subtree can be extracted or the scan is finished.
    ///
    /// On success the calling worker counts as busy until its matching
    /// `release`. Returns `None` once the completion flag is set.
    pub fn acquire(&self) -> Option<Subtree> {
        let mut state = self.state.lock().unwrap();
        loop {
            while state.fast.is_empty() && state.slow.is_empty() && !state.finished {
                state = self.available.wait(state).unwrap();
            }
            if state.finished {
                return None;
            }
            if let Some(sub) = Self::extract(&mut state, self.dual_pool) {
                state.busy += 1;
                self.busy_now.store(state.busy, Ordering::Relaxed);
                return Some(sub);
            }
        }
    }

    /// Weighted extraction between the two pools (mutex held by caller)
    fn extract(state: &mut PoolState, dual_pool: bool) -> Option<Subtree> {
        if !dual_pool {
            return state.fast.pop_front();
        }

        let sub = if state.fast_budget > 0 {
            match state.fast.pop_front() {
                Some(r) => {
                    state.fast_budget -= 1;
                    Some(r)
                }
                None => {
                    let r = state.slow.pop_front();
                    if r.is_some() {
                        state.fast_budget = Self::budget(state.fast.speed, state.slow.speed);
                    }
                    r
                }
            }
        } else {
            match state.slow.pop_front() {
                Some(r) => {
                    state.fast_budget = Self::budget(state.fast.speed, state.slow.speed);
                    Some(r)
                }
                // budget stays at zero
                None => state.fast.pop_front(),
            }
        };

        // keep the speeds meaningful as pools run dry
        if state.fast.is_empty() && state.slow.is_empty() {
            state.fast.speed = 0.0;
            state.slow.speed = 0.0;
        } else if state.fast.is_empty() {
            state.fast.speed = state.slow.speed;
        } else if state.slow.is_empty() {
            state.slow.speed = state.fast.speed;
        }

        sub
    }

    /// Number of fast extractions before the next slow one
    fn budget(fast_speed: f64, slow_speed: f64) -> u64 {
        if slow_speed == 0.0 {
            1
        } else {
            (fast_speed / slow_speed).ceil() as u64
        }
    }

    /// End a walk. The worker that drops the busy count to zero with both
    /// pools empty declares completion and wakes everyone.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.busy -= 1;
        self.busy_now.store(state.busy, Ordering::Relaxed);
        if state.busy == 0 && state.fast.is_empty() && state.slow.is_empty() {
            state.finished = true;
            self.finished_now.store(true, Ordering::Relaxed);
            self.available.notify_all();
        }
    }

    /// Splice a worker's backlog into a global pool.
    ///
    /// In two-pool mode the destination is chosen by comparing `speed`
    /// (the worker's directories-per-second since its last extraction)
    /// against the average of the two pool speeds; the chosen pool adopts
    /// the new speed. Single-pool mode always targets the fast pool and
    /// leaves speeds untouched. One wakeup is issued per spliced element.
    pub fn hand_over(&self, backlog: &mut Deq, speed: f64) {
        let count = backlog.len();
        if count == 0 {
            return;
        }

        {
            let mut state = self.state.lock().unwrap();
            if self.dual_pool {
                if speed >= (state.fast.speed + state.slow.speed) / 2.0 {
                    if self.stack_mode {
                        state.fast.splice_front(backlog);
                    } else {
                        state.fast.splice_back(backlog);
                    }
                    state.fast.speed = speed;
                } else {
                    if self.stack_mode {
                        state.slow.splice_front(backlog);
                    } else {
                        state.slow.splice_back(backlog);
                    }
                    state.slow.speed = speed;
                }
            } else if self.stack_mode {
                state.fast.splice_front(backlog);
            } else {
                state.fast.splice_back(backlog);
            }
        }

        for _ in 0..count {
            self.available.notify_one();
        }
    }

    /// The idleness probe: true when the busy ratio has fallen below the
    /// configured threshold. Reads the busy count without the mutex.
    pub fn too_many_idle(&self) -> bool {
        let busy = self.busy_now.load(Ordering::Relaxed);
        (busy as f64) / (self.workers as f64) < self.busy_threshold
    }

    /// Request shutdown (signal handler path): set the completion flag and
    /// wake all blocked workers. Walks already in flight finish first.
    pub fn request_shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.finished {
            state.finished = true;
            self.finished_now.store(true, Ordering::Relaxed);
            self.interrupted.store(true, Ordering::Relaxed);
            self.available.notify_all();
        }
    }

    /// Check the completion flag without taking the mutex
    pub fn is_finished(&self) -> bool {
        self.finished_now.load(Ordering::Relaxed)
    }

    /// Whether shutdown came from a signal rather than pool exhaustion
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    /// Current busy-worker count (relaxed read)
    pub fn busy_count(&self) -> usize {
        self.busy_now.load(Ordering::Relaxed)
    }

    /// Configured worker total
    pub fn worker_total(&self) -> usize {
        self.workers
    }

    /// Whether the fast/slow split is active
    pub fn dual_pool(&self) -> bool {
        self.dual_pool
    }

    /// Snapshot the pool lengths and speeds for progress display
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock().unwrap();
        PoolSnapshot {
            fast_len: state.fast.len(),
            fast_speed: state.fast.speed,
            slow_len: state.slow.len(),
            slow_speed: state.slow.speed,
        }
    }
}
