//! Parallel mark-and-sweep collector.
//!
//! Collection runs in two phases over a pool of worker threads:
//!
//! 1. **Mark**: one task per registered root. Each task dispatches
//!    through the root's kind and sets the marked flag on every block the
//!    root references. Marks are atomic bit-ors, so concurrent markers
//!    racing on a shared block are safe.
//! 2. **Sweep**: one task per segment. Each task walks the segment's
//!    block chain linearly: a marked block is unmarked (it survives), an
//!    unmarked block is flagged free.
//!
//! No marking worklist is needed: blocks hold no references to other
//! blocks, so every reachable block is directly referenced by a root.
//! Free-list reconstruction is the coalescer's job, not the sweeper's.
//!
//! Both phases must run inside the manager's stop-the-world window: the
//! caller holds every segment lock and the registry lock for the whole
//! cycle.

use crate::config::{ConfigError, TOTAL_SEGMENTS};
use crate::heap::{Heap, Segment};
use crate::pool::{Latch, WorkerPool};
use crate::roots::RegistryGuard;

use std::sync::Arc;

/// Stop-the-world mark-and-sweep collector.
pub struct Collector {
    pool: WorkerPool,
}

impl Collector {
    /// Create a collector with `threads` workers.
    pub fn new(threads: usize) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::NoGcThreads);
        }
        Ok(Self {
            pool: WorkerPool::new("ember-gc", threads)?,
        })
    }

    /// Run one full mark-and-sweep cycle.
    ///
    /// The caller must hold the registry lock (passed in as the guard)
    /// and every segment lock.
    pub fn collect(&self, roots: &RegistryGuard<'_>, heap: &Arc<Heap>) {
        self.mark(roots);
        self.sweep(heap);
    }

    /// Mark every block reachable from the registered roots.
    fn mark(&self, roots: &RegistryGuard<'_>) {
        if roots.is_empty() {
            return;
        }

        let latch = Arc::new(Latch::new(roots.len()));
        for root in roots.roots() {
            let root = Arc::clone(root);
            let latch = Arc::clone(&latch);
            self.pool.execute(move || {
                root.mark_live();
                latch.count_down();
            });
        }
        latch.wait();
    }

    /// Sweep every segment in parallel.
    fn sweep(&self, heap: &Arc<Heap>) {
        let latch = Arc::new(Latch::new(TOTAL_SEGMENTS));
        for index in 0..TOTAL_SEGMENTS {
            let heap = Arc::clone(heap);
            let latch = Arc::clone(&latch);
            self.pool.execute(move || {
                sweep_segment(heap.segment(index));
                latch.count_down();
            });
        }
        latch.wait();
    }
}

/// Sweep a single segment: unmark survivors, free the unreachable.
fn sweep_segment(segment: &Segment) {
    for header in segment.blocks() {
        let header = unsafe { &*header };
        if header.is_marked() {
            header.set_marked(false);
        } else {
            header.set_free(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roots::{GlobalRoot, Root, RootRegistry};
    use std::ptr::NonNull;

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(Collector::new(0), Err(ConfigError::NoGcThreads)));
    }

    #[test]
    fn test_sweep_frees_unmarked_block() {
        let heap = Arc::new(Heap::new());
        let first = heap.segment(0).first_block();
        unsafe {
            (*first).set_free(false);
            (*first).set_marked(false);
        }

        let collector = Collector::new(1).expect("collector");
        let registry = RootRegistry::new();
        collector.collect(&registry.lock(), &heap);

        assert!(unsafe { &*first }.is_free());
    }

    #[test]
    fn test_rooted_block_survives_sweep() {
        let heap = Arc::new(Heap::new());
        let first = heap.segment(0).first_block();
        unsafe {
            (*first).set_free(false);
        }

        let registry = RootRegistry::new();
        registry.add_root(
            "g0",
            Root::Global(GlobalRoot::new(NonNull::new(first))),
        );

        let collector = Collector::new(2).expect("collector");
        collector.collect(&registry.lock(), &heap);

        let header = unsafe { &*first };
        assert!(!header.is_free());
        assert!(!header.is_marked());
    }
}
