//! The heap manager: allocation protocol and collection coordination.
//!
//! Allocation follows a two-phase protocol. The fast path probes segments
//! of the request's size class a bounded number of times, taking one
//! segment lock per attempt. On exhaustion the allocator escalates: one
//! thread wins a flag CAS and becomes the stop-the-world leader, runs a
//! full collection, and wakes every other allocator that lost the race;
//! all of them then retry exactly once.
//!
//! Segment selection uses a rotating per-size-class cursor so that
//! concurrent allocators spread across the class instead of convoying on
//! one segment, and try-locks so the scan never blocks while holding
//! another lock. `collect_garbage` acquires every segment lock in index
//! order while no other path ever holds more than one, so the protocol is
//! deadlock-free.

use crate::collector::Collector;
use crate::config::{
    ConfigError, HeapConfig, MEDIUM_OBJECT_SEGMENTS, MEDIUM_OBJECT_THRESHOLD,
    SMALL_OBJECT_SEGMENTS, SMALL_OBJECT_THRESHOLD, TOTAL_SEGMENTS,
};
use crate::heap::{BlockHeader, FreeMemoryTable, Heap, HEADER_SIZE};
use crate::pool::{Latch, WorkerPool};
use crate::roots::{Root, RootRegistry};
use crate::stats::HeapStats;

use parking_lot::{Condvar, Mutex, MutexGuard};
use smallvec::SmallVec;
use std::ops::Range;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Fast probing rounds before an allocator escalates to a collection.
const FAST_ATTEMPTS: usize = 3;

/// Object size classes, each backed by its own segment range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Payloads up to [`SMALL_OBJECT_THRESHOLD`] bytes.
    Small = 0,
    /// Payloads up to [`MEDIUM_OBJECT_THRESHOLD`] bytes.
    Medium = 1,
    /// Payloads above the medium threshold.
    Large = 2,
}

impl SizeClass {
    /// Smallest class able to hold a payload of `bytes`.
    pub fn of(bytes: u32) -> Self {
        if bytes <= SMALL_OBJECT_THRESHOLD {
            SizeClass::Small
        } else if bytes <= MEDIUM_OBJECT_THRESHOLD {
            SizeClass::Medium
        } else {
            SizeClass::Large
        }
    }

    /// Flat segment-index range backing this class.
    pub fn segment_range(self) -> Range<usize> {
        match self {
            SizeClass::Small => 0..SMALL_OBJECT_SEGMENTS,
            SizeClass::Medium => {
                SMALL_OBJECT_SEGMENTS..SMALL_OBJECT_SEGMENTS + MEDIUM_OBJECT_SEGMENTS
            }
            SizeClass::Large => SMALL_OBJECT_SEGMENTS + MEDIUM_OBJECT_SEGMENTS..TOTAL_SEGMENTS,
        }
    }
}

/// Concurrent, garbage-collected heap manager.
///
/// Owns the segmented heap, the free-memory table, the root registry,
/// and the collector, and coordinates mutator allocation with at most
/// one concurrent stop-the-world collection.
pub struct HeapManager {
    /// Segmented memory for block allocation.
    heap: Arc<Heap>,
    /// Per-segment free-list heads and free-byte counters.
    free_table: Arc<FreeMemoryTable>,
    /// Named roots feeding the marker.
    registry: RootRegistry,
    /// Mark/sweep worker pool.
    collector: Collector,
    /// Pool that coalesces segments after each sweep.
    coalesce_pool: WorkerPool,
    /// One lock per segment; only the holder may touch its block chain.
    segment_locks: [Mutex<()>; TOTAL_SEGMENTS],
    /// Set while a stop-the-world cycle is running.
    gc_in_progress: AtomicBool,
    /// Pairs with `gc_done` to park allocators during a cycle.
    gc_wait: Mutex<()>,
    /// Signaled by the leader once the cycle finishes.
    gc_done: Condvar,
    /// Rotating segment cursor per size class.
    cursors: [AtomicUsize; 3],
    /// Allocation and collection counters.
    stats: HeapStats,
}

impl HeapManager {
    /// Create a heap manager, its segments, and its worker pools.
    pub fn new(config: HeapConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let heap = Arc::new(Heap::new());
        let free_table = Arc::new(FreeMemoryTable::new());
        for index in 0..TOTAL_SEGMENTS {
            let segment = heap.segment(index);
            let initial = unsafe { (*segment.first_block()).size() };
            free_table.update_segment(index, initial, segment.first_block());
        }

        Ok(Self {
            heap,
            free_table,
            registry: RootRegistry::new(),
            collector: Collector::new(config.gc_threads)?,
            coalesce_pool: WorkerPool::new("ember-coalesce", config.coalesce_threads)?,
            segment_locks: std::array::from_fn(|_| Mutex::new(())),
            gc_in_progress: AtomicBool::new(false),
            gc_wait: Mutex::new(()),
            gc_done: Condvar::new(),
            cursors: [
                AtomicUsize::new(SMALL_OBJECT_SEGMENTS - 1),
                AtomicUsize::new(SMALL_OBJECT_SEGMENTS + MEDIUM_OBJECT_SEGMENTS - 1),
                AtomicUsize::new(TOTAL_SEGMENTS - 1),
            ],
            stats: HeapStats::new(),
        })
    }

    /// Create a heap manager with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(HeapConfig::default()).expect("invalid default heap configuration")
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a block with at least `bytes` payload bytes.
    ///
    /// The request is rounded up to a multiple of 16. Returns the block
    /// header; the payload starts at [`BlockHeader::data_ptr`]. `None`
    /// means the heap is exhausted even after a collection cycle.
    pub fn allocate(&self, bytes: u32) -> Option<NonNull<BlockHeader>> {
        if bytes == 0 {
            return None;
        }
        let bytes = (bytes + 15) & !15;

        for _ in 0..FAST_ATTEMPTS {
            if let Some(index) = self.find_suitable_segment(bytes) {
                let _guard = self.segment_locks[index].lock();
                if let Some(block) = self.allocate_from_segment(index, bytes) {
                    self.stats
                        .record_allocation(unsafe { block.as_ref() }.size() as u64);
                    return Some(block);
                }
            }
        }

        // Exhausted. Exactly one allocator becomes the collection leader;
        // the rest park until it finishes, then everyone retries once.
        if self
            .gc_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.collect_garbage();
            let _wait_guard = self.gc_wait.lock();
            self.gc_in_progress.store(false, Ordering::Release);
            self.gc_done.notify_all();
        } else {
            let mut wait_guard = self.gc_wait.lock();
            while self.gc_in_progress.load(Ordering::Acquire) {
                self.gc_done.wait(&mut wait_guard);
            }
        }

        let block = match self.find_suitable_segment(bytes) {
            Some(index) => {
                let _guard = self.segment_locks[index].lock();
                self.allocate_from_segment(index, bytes)
            }
            None => None,
        };

        match block {
            Some(block) => {
                self.stats
                    .record_allocation(unsafe { block.as_ref() }.size() as u64);
                Some(block)
            }
            None => {
                self.stats.record_failure();
                None
            }
        }
    }

    /// Find a segment of the request's size class that looks able to hold
    /// `bytes` more payload.
    ///
    /// Scans the class once starting just past the rotating cursor,
    /// try-locking candidates. A segment whose try-lock fails is
    /// remembered as a fallback (the roomiest one wins) so a fully
    /// contended class still makes progress: the caller block-locks the
    /// fallback.
    fn find_suitable_segment(&self, bytes: u32) -> Option<usize> {
        let class = SizeClass::of(bytes);
        let range = class.segment_range();
        let cursor = &self.cursors[class as usize];

        let count = range.len();
        let mut fallback: Option<usize> = None;
        let mut fallback_free = 0u32;

        let last_used = cursor.load(Ordering::Acquire);
        let start_offset = if range.contains(&last_used) {
            last_used - range.start
        } else {
            0
        };

        for offset in 0..count {
            let index = range.start + (start_offset + offset + 1) % count;

            let Some(free_bytes) = self.free_table.free_bytes(index) else {
                continue;
            };
            if (free_bytes as usize) < bytes as usize + HEADER_SIZE {
                continue;
            }

            if fallback.is_none() || fallback_free < free_bytes {
                fallback = Some(index);
                fallback_free = free_bytes;
            }

            let Some(guard) = self.segment_locks[index].try_lock() else {
                continue;
            };
            drop(guard);

            cursor.store(index, Ordering::Release);
            return Some(index);
        }

        if let Some(index) = fallback {
            cursor.store(index, Ordering::Release);
        }
        fallback
    }

    /// First-fit allocation from a segment's free list.
    ///
    /// The caller must hold segment `index`'s lock. Splits the chosen
    /// block when the remainder can hold a header plus a minimal payload,
    /// unlinks it, and returns it unmarked and not-free.
    fn allocate_from_segment(&self, index: usize, bytes: u32) -> Option<NonNull<BlockHeader>> {
        let info = self.free_table.info(index)?;
        if info.head().is_null() {
            return None;
        }

        let mut prev: *mut BlockHeader = ptr::null_mut();
        let mut current = info.head();

        unsafe {
            while !current.is_null() {
                if (*current).is_free() && (*current).size >= bytes {
                    break;
                }
                prev = current;
                current = (*current).next;
            }

            if current.is_null() {
                return None;
            }

            let remaining = (*current).size - bytes;
            if remaining as usize >= HEADER_SIZE + 16 {
                let split =
                    (current as *mut u8).add(HEADER_SIZE + bytes as usize) as *mut BlockHeader;
                split.write(BlockHeader::free_block(
                    remaining - HEADER_SIZE as u32,
                    (*current).next,
                ));

                (*current).size = bytes;
                (*current).next = split;
            }

            (*current).set_free(false);
            (*current).set_marked(false);

            if prev.is_null() {
                info.set_head((*current).next);
            } else {
                (*prev).next = (*current).next;
            }
            (*current).next = ptr::null_mut();

            let cost = (*current).size + HEADER_SIZE as u32;
            info.set_free_bytes(info.free_bytes().saturating_sub(cost));

            Some(NonNull::new_unchecked(current))
        }
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Run a full stop-the-world collection cycle.
    ///
    /// Holds the registry lock and every segment lock (acquired in index
    /// order) for the whole cycle: mark, sweep, then per-segment
    /// coalescing. May be called directly, at the cost of a full pause.
    pub fn collect_garbage(&self) {
        let start = Instant::now();
        let roots = self.registry.lock();

        let _segment_guards: SmallVec<[MutexGuard<'_, ()>; TOTAL_SEGMENTS]> =
            self.segment_locks.iter().map(|lock| lock.lock()).collect();

        self.collector.collect(&roots, &self.heap);
        self.coalesce_segments();

        self.stats.record_collection(start.elapsed());
    }

    /// Rebuild every segment's free list in parallel.
    ///
    /// Must run inside the stop-the-world window, after the sweep.
    fn coalesce_segments(&self) {
        let latch = Arc::new(Latch::new(TOTAL_SEGMENTS));

        for index in 0..TOTAL_SEGMENTS {
            let heap = Arc::clone(&self.heap);
            let free_table = Arc::clone(&self.free_table);
            let latch = Arc::clone(&latch);
            self.coalesce_pool.execute(move || {
                coalesce_segment(&heap, &free_table, index);
                latch.count_down();
            });
        }

        latch.wait();
    }

    // =========================================================================
    // Root-registry facade
    // =========================================================================

    /// Register a root under `key`, replacing any existing entry.
    pub fn add_root(&self, key: impl Into<String>, root: Root) -> Arc<Root> {
        self.registry.add_root(key, root)
    }

    /// Look up a registered root.
    pub fn get_root(&self, key: &str) -> Option<Arc<Root>> {
        self.registry.get_root(key)
    }

    /// Remove the root registered under `key`, if any.
    pub fn remove_root(&self, key: &str) {
        self.registry.remove_root(key);
    }

    /// Remove every registered root.
    pub fn clear_roots(&self) {
        self.registry.clear();
    }

    /// Number of registered roots.
    pub fn root_count(&self) -> usize {
        self.registry.len()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The segmented heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The free-memory table.
    pub fn free_table(&self) -> &FreeMemoryTable {
        &self.free_table
    }

    /// Allocation and collection counters.
    pub fn stats(&self) -> &HeapStats {
        &self.stats
    }
}

/// Merge runs of consecutive free blocks in a segment and rebuild its
/// free list and free-byte counter.
///
/// A segment without a free-table summary is skipped. The walk stops on a
/// zero-sized header or one whose payload would spill past the segment
/// end.
fn coalesce_segment(heap: &Heap, free_table: &FreeMemoryTable, index: usize) {
    let Some(info) = free_table.info(index) else {
        return;
    };
    let segment = heap.segment(index);

    let mut free_list: *mut BlockHeader = ptr::null_mut();
    let mut free_bytes: u32 = 0;

    let end = segment.end() as usize;
    let mut cursor = segment.base();

    unsafe {
        while (cursor as usize) + HEADER_SIZE <= end {
            let header = cursor as *mut BlockHeader;
            let size = (*header).size as usize;
            if size == 0 || (cursor as usize) + HEADER_SIZE + size > end {
                break;
            }

            // Absorb the following blocks while both sides stay free.
            let mut next_cursor = cursor.add(HEADER_SIZE + (*header).size as usize);
            while (next_cursor as usize) + HEADER_SIZE <= end {
                let next_header = next_cursor as *mut BlockHeader;
                if !(*header).is_free() || !(*next_header).is_free() {
                    break;
                }
                (*header).size += HEADER_SIZE as u32 + (*next_header).size;
                next_cursor = cursor.add(HEADER_SIZE + (*header).size as usize);
            }

            if (*header).is_free() {
                (*header).next = free_list;
                free_list = header;
                free_bytes += (*header).size + HEADER_SIZE as u32;
            }

            cursor = cursor.add(HEADER_SIZE + (*header).size as usize);
        }
    }

    info.set_head(free_list);
    info.set_free_bytes(free_bytes);
}
