//! Heap and collection statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters describing allocation and collection activity.
#[derive(Debug)]
pub struct HeapStats {
    /// Total payload bytes handed out since start.
    pub bytes_allocated: AtomicU64,
    /// Total blocks handed out since start.
    pub blocks_allocated: AtomicU64,
    /// Allocations that returned null even after a collection.
    pub failed_allocations: AtomicU64,
    /// Number of completed collection cycles.
    pub collections: AtomicU64,
    /// Total time spent in collection cycles (nanoseconds).
    pub gc_time_ns: AtomicU64,
}

impl HeapStats {
    /// Create zeroed statistics.
    pub const fn new() -> Self {
        Self {
            bytes_allocated: AtomicU64::new(0),
            blocks_allocated: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            gc_time_ns: AtomicU64::new(0),
        }
    }

    /// Record a successful allocation of `bytes` payload bytes.
    #[inline]
    pub fn record_allocation(&self, bytes: u64) {
        self.bytes_allocated.fetch_add(bytes, Ordering::Relaxed);
        self.blocks_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an allocation that failed after the retry protocol.
    #[inline]
    pub fn record_failure(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed collection cycle.
    pub fn record_collection(&self, duration: Duration) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.gc_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Number of completed collection cycles.
    #[inline]
    pub fn collections(&self) -> u64 {
        self.collections.load(Ordering::Relaxed)
    }

    /// Total time spent collecting.
    pub fn total_gc_time(&self) -> Duration {
        Duration::from_nanos(self.gc_time_ns.load(Ordering::Relaxed))
    }

    /// Average collection pause.
    pub fn avg_gc_pause(&self) -> Duration {
        let count = self.collections.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.gc_time_ns.load(Ordering::Relaxed) / count)
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.bytes_allocated.store(0, Ordering::Relaxed);
        self.blocks_allocated.store(0, Ordering::Relaxed);
        self.failed_allocations.store(0, Ordering::Relaxed);
        self.collections.store(0, Ordering::Relaxed);
        self.gc_time_ns.store(0, Ordering::Relaxed);
    }

    /// Print a summary of heap activity to stderr.
    pub fn print_summary(&self) {
        eprintln!("=== Heap Statistics ===");
        eprintln!(
            "Allocations: {} blocks, {}",
            self.blocks_allocated.load(Ordering::Relaxed),
            format_bytes(self.bytes_allocated.load(Ordering::Relaxed))
        );
        eprintln!(
            "Failed allocations: {}",
            self.failed_allocations.load(Ordering::Relaxed)
        );
        eprintln!(
            "Collections: {} ({:?} total, {:?} avg pause)",
            self.collections.load(Ordering::Relaxed),
            self.total_gc_time(),
            self.avg_gc_pause()
        );
    }
}

impl Default for HeapStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Format bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_recording() {
        let stats = HeapStats::new();
        stats.record_allocation(32);
        stats.record_allocation(64);

        assert_eq!(stats.bytes_allocated.load(Ordering::Relaxed), 96);
        assert_eq!(stats.blocks_allocated.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_collection_timing() {
        let stats = HeapStats::new();
        stats.record_collection(Duration::from_micros(100));
        stats.record_collection(Duration::from_micros(300));

        assert_eq!(stats.collections(), 2);
        assert_eq!(stats.avg_gc_pause(), Duration::from_micros(200));
    }

    #[test]
    fn test_reset() {
        let stats = HeapStats::new();
        stats.record_allocation(32);
        stats.record_failure();
        stats.reset();

        assert_eq!(stats.bytes_allocated.load(Ordering::Relaxed), 0);
        assert_eq!(stats.failed_allocations.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(16 * 1024 * 1024), "16.00 MB");
    }
}
