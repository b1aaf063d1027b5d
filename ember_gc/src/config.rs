//! Heap layout constants and runtime configuration.
//!
//! The segment layout (sizes, counts, size-class thresholds) is fixed at
//! compile time; the lock table and the collector's completion latches are
//! sized from these constants. Worker-pool widths are runtime configuration.

/// Size of a single heap segment in bytes.
pub const SEGMENT_SIZE: usize = 16 * 1024 * 1024;

/// Alignment of segment memory and of every block header within it.
pub const SEGMENT_ALIGN: usize = 16;

/// Number of segments reserved for small objects.
pub const SMALL_OBJECT_SEGMENTS: usize = 4;

/// Number of segments reserved for medium objects.
pub const MEDIUM_OBJECT_SEGMENTS: usize = 2;

/// Number of segments reserved for large objects.
pub const LARGE_OBJECT_SEGMENTS: usize = 2;

/// Total number of segments on the heap.
pub const TOTAL_SEGMENTS: usize =
    SMALL_OBJECT_SEGMENTS + MEDIUM_OBJECT_SEGMENTS + LARGE_OBJECT_SEGMENTS;

/// Maximum payload size of a small object in bytes.
pub const SMALL_OBJECT_THRESHOLD: u32 = 256;

/// Maximum payload size of a medium object in bytes.
pub const MEDIUM_OBJECT_THRESHOLD: u32 = 2 * 1024;

/// Maximum payload size of a large object in bytes.
pub const LARGE_OBJECT_THRESHOLD: u32 = 256 * 1024;

/// Runtime configuration for a heap manager instance.
///
/// # Example
///
/// ```ignore
/// use ember_gc::HeapConfig;
///
/// let config = HeapConfig {
///     gc_threads: 4,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Number of worker threads in the coalescing pool.
    ///
    /// Coalescing runs once per segment at the end of every collection
    /// cycle; more threads shorten the stop-the-world tail.
    ///
    /// Default: available parallelism minus one, minimum 1.
    pub coalesce_threads: usize,

    /// Number of worker threads in the collector pool.
    ///
    /// Mark tasks (one per registered root) and sweep tasks (one per
    /// segment) are distributed over this pool.
    ///
    /// Default: available parallelism minus one, minimum 1.
    pub gc_threads: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        let workers = num_cpus().saturating_sub(1).max(1);
        Self {
            coalesce_threads: workers,
            gc_threads: workers,
        }
    }
}

impl HeapConfig {
    /// Configuration with one worker per pool, for deterministic tests.
    pub fn single_threaded() -> Self {
        Self {
            coalesce_threads: 1,
            gc_threads: 1,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coalesce_threads == 0 {
            return Err(ConfigError::NoCoalesceThreads);
        }
        if self.gc_threads == 0 {
            return Err(ConfigError::NoGcThreads);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Coalescing pool must have at least one worker.
    NoCoalesceThreads,
    /// Collector pool must have at least one worker.
    NoGcThreads,
    /// A worker pool was constructed with zero threads.
    NoPoolThreads,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoCoalesceThreads => {
                write!(f, "coalescing pool needs at least one thread")
            }
            ConfigError::NoGcThreads => write!(f, "collector pool needs at least one thread"),
            ConfigError::NoPoolThreads => write!(f, "worker pool needs at least one thread"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Get the number of available CPUs.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(HeapConfig::default().validate().is_ok());
    }

    #[test]
    fn test_single_threaded_config_is_valid() {
        assert!(HeapConfig::single_threaded().validate().is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = HeapConfig {
            coalesce_threads: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoCoalesceThreads));

        let config = HeapConfig {
            gc_threads: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoGcThreads));
    }

    #[test]
    fn test_segment_layout_constants() {
        assert!(SMALL_OBJECT_THRESHOLD < MEDIUM_OBJECT_THRESHOLD);
        assert!(MEDIUM_OBJECT_THRESHOLD < LARGE_OBJECT_THRESHOLD);
        assert_eq!(TOTAL_SEGMENTS, 8);
        assert_eq!(SEGMENT_SIZE % SEGMENT_ALIGN, 0);
    }
}
