//! Fixed-size worker pools and completion latches.
//!
//! Every parallel phase in the heap manager (marking, sweeping,
//! coalescing, and the simulation workload) runs as tasks on a
//! [`WorkerPool`] and rendezvouses on a [`Latch`]. Pools drain their
//! queue before joining on shutdown.

use crate::config::ConfigError;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of worker threads consuming tasks from a shared queue.
pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` named workers.
    pub fn new(name: &str, threads: usize) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::NoPoolThreads);
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();
        let workers = (0..threads)
            .map(|i| {
                let receiver: Receiver<Task> = receiver.clone();
                thread::Builder::new()
                    .name(format!("{name}-{i}"))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            task();
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Enqueue a task for execution on the pool.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(task));
        }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain the queue and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// One-shot countdown latch.
///
/// A phase creates a latch for its task count; each task counts down once
/// and the coordinating thread blocks in [`Latch::wait`] until the count
/// reaches zero.
pub struct Latch {
    remaining: Mutex<usize>,
    zeroed: Condvar,
}

impl Latch {
    /// Create a latch expecting `count` completions.
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            zeroed: Condvar::new(),
        }
    }

    /// Record one completion.
    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            if *remaining == 0 {
                self.zeroed.notify_all();
            }
        }
    }

    /// Block until every expected completion has been recorded.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.zeroed.wait(&mut remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            WorkerPool::new("test", 0),
            Err(ConfigError::NoPoolThreads)
        ));
    }

    #[test]
    fn test_tasks_run_and_latch_releases() {
        let pool = WorkerPool::new("test", 4).expect("pool");
        let counter = Arc::new(AtomicUsize::new(0));
        let latch = Arc::new(Latch::new(32));

        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            let latch = Arc::clone(&latch);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                latch.count_down();
            });
        }

        latch.wait();
        assert_eq!(counter.load(Ordering::Relaxed), 32);
    }

    #[test]
    fn test_drop_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new("test", 1).expect("pool");
            for _ in 0..16 {
                let counter = Arc::clone(&counter);
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        }
        assert_eq!(counter.load(Ordering::Relaxed), 16);
    }

    #[test]
    fn test_empty_latch_does_not_block() {
        Latch::new(0).wait();
    }
}
