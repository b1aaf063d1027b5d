//! Ember Heap Manager
//!
//! A concurrent, segmented, mark-and-sweep garbage-collected heap that
//! simulates the memory subsystem of a managed-language runtime.
//!
//! # Architecture
//!
//! The heap is a fixed set of pre-reserved segments partitioned into
//! three size classes (small / medium / large). Every block on a segment
//! is prefixed by a 16-byte header carrying its size, a free-list link,
//! and an atomic flag word with independent FREE and MARKED bits.
//!
//! - **Allocation** probes the request's size class with a rotating
//!   cursor and per-segment try-locks, then walks the chosen segment's
//!   free list first-fit, splitting oversized blocks.
//!
//! - **Reachability** comes exclusively from named roots: thread-local
//!   stacks of scoped bindings, global slots, and register slots,
//!   collected in a registry behind a single lock.
//!
//! - **Collection** is stop-the-world: when allocation fails after a few
//!   fast retries, one allocator wins a flag CAS, takes every segment
//!   lock, marks all roots in parallel, sweeps all segments in parallel,
//!   coalesces adjacent free blocks, and wakes the waiting allocators to
//!   retry once.
//!
//! # Usage
//!
//! ```ignore
//! use ember_gc::{GlobalRoot, HeapManager, Root};
//!
//! let manager = HeapManager::with_defaults();
//!
//! let block = manager.allocate(64).expect("out of memory");
//! let global = manager.add_root("g0", Root::Global(GlobalRoot::new(Some(block))));
//!
//! // Unrooted blocks are reclaimed by the next cycle.
//! manager.collect_garbage();
//! ```
//!
//! Blocks hold no references to other blocks, so marking is a flat visit
//! over the root set; there is no tracing worklist.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collector;
pub mod config;
pub mod heap;
pub mod manager;
pub mod pool;
pub mod roots;

mod stats;

// Re-exports for convenient access
pub use collector::Collector;
pub use config::{ConfigError, HeapConfig};
pub use heap::{BlockHeader, FreeMemoryTable, Heap, Segment, HEADER_SIZE};
pub use manager::{HeapManager, SizeClass};
pub use pool::{Latch, WorkerPool};
pub use roots::{
    GlobalRoot, RegisterRoot, Root, RootError, RootRegistry, ThreadLocalStack,
};
pub use stats::HeapStats;
