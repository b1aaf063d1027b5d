//! Per-segment free-memory summaries.
//!
//! The table maps a flat segment index to the head of that segment's
//! free-block chain and a free-byte counter. The counter doubles as a
//! lock-free probing hint for segment selection: allocators read it
//! without holding the segment lock and re-check under the lock.

use super::header::BlockHeader;

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::ops::Deref;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

/// Summary of a single segment's free memory.
pub struct SegmentInfo {
    /// Free bytes in the segment, counting block headers of free blocks.
    free_bytes: AtomicU32,
    /// Head of the segment's free-block chain.
    free_list_head: AtomicPtr<BlockHeader>,
}

impl SegmentInfo {
    /// Create a summary with the given counter and chain head.
    pub fn new(free_bytes: u32, free_list_head: *mut BlockHeader) -> Self {
        Self {
            free_bytes: AtomicU32::new(free_bytes),
            free_list_head: AtomicPtr::new(free_list_head),
        }
    }

    /// Load the free-byte counter.
    ///
    /// The value may be stale relative to a concurrent allocator; it is a
    /// suitability hint, not an entitlement.
    #[inline]
    pub fn free_bytes(&self) -> u32 {
        self.free_bytes.load(Ordering::Acquire)
    }

    /// Publish a new counter value. Caller owns the segment (its lock or
    /// the stop-the-world window).
    #[inline]
    pub(crate) fn set_free_bytes(&self, bytes: u32) {
        self.free_bytes.store(bytes, Ordering::Release);
    }

    /// Head of the free-block chain. Caller owns the segment.
    #[inline]
    pub(crate) fn head(&self) -> *mut BlockHeader {
        self.free_list_head.load(Ordering::Acquire)
    }

    /// Replace the head of the free-block chain. Caller owns the segment.
    #[inline]
    pub(crate) fn set_head(&self, head: *mut BlockHeader) {
        self.free_list_head.store(head, Ordering::Release);
    }
}

/// Table of free-memory summaries for every segment on the heap.
pub struct FreeMemoryTable {
    table: DashMap<usize, SegmentInfo, FxBuildHasher>,
}

impl FreeMemoryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            table: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Insert or replace the summary for a segment.
    pub fn update_segment(&self, index: usize, free_bytes: u32, free_list_head: *mut BlockHeader) {
        self.table
            .insert(index, SegmentInfo::new(free_bytes, free_list_head));
    }

    /// Summary for a segment, if one exists.
    pub fn info(&self, index: usize) -> Option<impl Deref<Target = SegmentInfo> + '_> {
        self.table.get(&index)
    }

    /// Free-byte counter for a segment, if a summary exists.
    #[inline]
    pub fn free_bytes(&self, index: usize) -> Option<u32> {
        self.table.get(&index).map(|info| info.free_bytes())
    }

    /// Remove the summary for a segment.
    pub fn remove_segment(&self, index: usize) {
        self.table.remove(&index);
    }

    /// Remove all summaries.
    pub fn clear_segments(&self) {
        self.table.clear();
    }

    /// Number of segments with a summary.
    pub fn segment_count(&self) -> usize {
        self.table.len()
    }
}

impl Default for FreeMemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn test_update_and_probe() {
        let table = FreeMemoryTable::new();
        assert!(table.free_bytes(0).is_none());

        table.update_segment(0, 4096, ptr::null_mut());
        assert_eq!(table.free_bytes(0), Some(4096));
        assert_eq!(table.segment_count(), 1);

        table.update_segment(0, 1024, ptr::null_mut());
        assert_eq!(table.free_bytes(0), Some(1024));
        assert_eq!(table.segment_count(), 1);
    }

    #[test]
    fn test_counter_and_head_round_trip() {
        let table = FreeMemoryTable::new();
        let mut header = BlockHeader::free_block(128, ptr::null_mut());
        let head = &mut header as *mut BlockHeader;

        table.update_segment(3, 144, head);
        let info = table.info(3).expect("missing summary");
        assert_eq!(info.free_bytes(), 144);
        assert_eq!(info.head(), head);

        info.set_free_bytes(0);
        info.set_head(ptr::null_mut());
        assert_eq!(info.free_bytes(), 0);
        assert!(info.head().is_null());
    }

    #[test]
    fn test_remove_and_clear() {
        let table = FreeMemoryTable::new();
        table.update_segment(0, 1, ptr::null_mut());
        table.update_segment(1, 2, ptr::null_mut());

        table.remove_segment(0);
        assert!(table.info(0).is_none());
        assert_eq!(table.segment_count(), 1);

        table.clear_segments();
        assert_eq!(table.segment_count(), 0);
    }
}
