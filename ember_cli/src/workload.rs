//! Synthetic mutator workload.
//!
//! Simulates managed-language allocation traffic against the heap
//! manager: thread-local stacks cycling through scopes of fresh
//! bindings, and global/register slots alternately rebound to fresh
//! blocks and cleared. Object sizes follow the usual runtime skew of
//! mostly small, occasionally medium, rarely large.

use ember_gc::config::{
    LARGE_OBJECT_THRESHOLD, MEDIUM_OBJECT_THRESHOLD, SMALL_OBJECT_THRESHOLD,
};
use ember_gc::{
    ConfigError, GlobalRoot, HeapManager, Latch, RegisterRoot, Root, ThreadLocalStack, WorkerPool,
};

use rand::Rng;
use std::sync::Arc;
use std::time::Instant;

/// Scopes each thread-local stack cycles through per run.
const TLS_SCOPES: usize = 8;

/// Allocations per thread-local stack in stress mode.
const TLS_ALLOCS_STRESS: usize = 8192;

/// Allocations per thread-local stack in relaxed mode.
const TLS_ALLOCS_RELAXED: usize = 1024;

/// Rebinds per global slot in stress mode.
const GLOBAL_REBINDS_STRESS: usize = 128;

/// Rebinds per global slot in relaxed mode.
const GLOBAL_REBINDS_RELAXED: usize = 32;

/// Rebinds per register slot in stress mode.
const REGISTER_REBINDS_STRESS: usize = 128;

/// Rebinds per register slot in relaxed mode.
const REGISTER_REBINDS_RELAXED: usize = 32;

/// Intensity of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    /// Heavy traffic: enough allocation to force collection cycles.
    Stress,
    /// Light traffic: the heap should rarely, if ever, collect.
    Relaxed,
}

impl SimulationMode {
    /// Human-readable mode name.
    pub fn name(self) -> &'static str {
        match self {
            SimulationMode::Stress => "stress",
            SimulationMode::Relaxed => "relaxed",
        }
    }

    fn scope_count(self) -> usize {
        TLS_SCOPES
    }

    fn allocs_per_scope(self) -> usize {
        match self {
            SimulationMode::Stress => TLS_ALLOCS_STRESS / TLS_SCOPES,
            SimulationMode::Relaxed => TLS_ALLOCS_RELAXED / TLS_SCOPES,
        }
    }

    fn global_rebinds(self) -> usize {
        match self {
            SimulationMode::Stress => GLOBAL_REBINDS_STRESS,
            SimulationMode::Relaxed => GLOBAL_REBINDS_RELAXED,
        }
    }

    fn register_rebinds(self) -> usize {
        match self {
            SimulationMode::Stress => REGISTER_REBINDS_STRESS,
            SimulationMode::Relaxed => REGISTER_REBINDS_RELAXED,
        }
    }

    fn tls_map_capacity(self) -> usize {
        self.allocs_per_scope() * 2
    }
}

impl std::fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A workload instance: a mutator pool driving one heap manager.
pub struct Workload {
    manager: Arc<HeapManager>,
    pool: WorkerPool,
}

impl Workload {
    /// Create a workload with `threads` mutator threads.
    pub fn new(manager: Arc<HeapManager>, threads: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            manager,
            pool: WorkerPool::new("ember-mutator", threads)?,
        })
    }

    /// Run one simulation: register the roots, drive them concurrently,
    /// then clear everything and collect.
    pub fn run(
        &self,
        tls_count: usize,
        global_count: usize,
        register_count: usize,
        mode: SimulationMode,
    ) {
        println!("Initializing {} simulation", mode.name());
        let start = Instant::now();

        let latch = Arc::new(Latch::new(tls_count + global_count + register_count));

        for i in 0..tls_count {
            let root = self.manager.add_root(
                format!("t{i}"),
                Root::Tls(ThreadLocalStack::with_capacity(mode.tls_map_capacity())),
            );
            let manager = Arc::clone(&self.manager);
            let latch = Arc::clone(&latch);
            let (scopes, allocs) = (mode.scope_count(), mode.allocs_per_scope());
            self.pool.execute(move || {
                println!("TLS {i} is allocating...");
                if let Some(tls) = root.as_tls() {
                    run_tls(&manager, tls, scopes, allocs);
                }
                println!("TLS {i} finished");
                latch.count_down();
            });
        }

        for i in 0..global_count {
            let root = self
                .manager
                .add_root(format!("g{i}"), Root::Global(GlobalRoot::new(None)));
            let manager = Arc::clone(&self.manager);
            let latch = Arc::clone(&latch);
            let rebinds = mode.global_rebinds();
            self.pool.execute(move || {
                println!("Global {i} is allocating...");
                if let Some(global) = root.as_global() {
                    run_global(&manager, global, rebinds);
                }
                println!("Global {i} finished");
                latch.count_down();
            });
        }

        for i in 0..register_count {
            let root = self
                .manager
                .add_root(format!("r{i}"), Root::Register(RegisterRoot::new(None)));
            let manager = Arc::clone(&self.manager);
            let latch = Arc::clone(&latch);
            let rebinds = mode.register_rebinds();
            self.pool.execute(move || {
                println!("Register {i} is allocating...");
                if let Some(register) = root.as_register() {
                    run_register(&manager, register, rebinds);
                }
                println!("Register {i} finished");
                latch.count_down();
            });
        }

        latch.wait();
        let elapsed = start.elapsed();
        println!(
            "Total execution time: {} ms ({:.3} s)",
            elapsed.as_millis(),
            elapsed.as_secs_f64()
        );

        println!("Cleaning up after simulation");
        self.manager.clear_roots();
        self.manager.collect_garbage();
    }
}

/// Cycle a thread-local stack through scopes of fresh bindings.
fn run_tls(manager: &HeapManager, tls: &ThreadLocalStack, scopes: usize, allocs_per_scope: usize) {
    let mut rng = rand::thread_rng();
    for scope in 0..scopes {
        tls.push_scope();
        for i in 0..allocs_per_scope {
            let block = manager.allocate(random_size(&mut rng));
            tls.init(format!("{scope}_{i}"), block)
                .expect("tls variable name collision");
        }
        tls.pop_scope();
    }
}

/// Alternate a global slot between a fresh block and nothing.
fn run_global(manager: &HeapManager, global: &GlobalRoot, rebinds: usize) {
    let mut rng = rand::thread_rng();
    for i in 0..rebinds {
        global.set(if i & 1 == 1 {
            None
        } else {
            manager.allocate(random_size(&mut rng))
        });
    }
}

/// Alternate a register slot between a fresh block and nothing.
fn run_register(manager: &HeapManager, register: &RegisterRoot, rebinds: usize) {
    let mut rng = rand::thread_rng();
    for i in 0..rebinds {
        register.set(if i & 1 == 1 {
            None
        } else {
            manager.allocate(random_size(&mut rng))
        });
    }
}

/// Draw an object size: 80% small, 19% medium, 1% large.
fn random_size(rng: &mut impl Rng) -> u32 {
    let category = rng.gen_range(0..100);
    if category < 80 {
        rng.gen_range(1..=SMALL_OBJECT_THRESHOLD)
    } else if category < 99 {
        rng.gen_range(SMALL_OBJECT_THRESHOLD + 1..=MEDIUM_OBJECT_THRESHOLD)
    } else {
        rng.gen_range(MEDIUM_OBJECT_THRESHOLD + 1..=LARGE_OBJECT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parameters() {
        assert_eq!(SimulationMode::Stress.allocs_per_scope(), 1024);
        assert_eq!(SimulationMode::Relaxed.allocs_per_scope(), 128);
        assert_eq!(SimulationMode::Stress.global_rebinds(), 128);
        assert_eq!(SimulationMode::Relaxed.register_rebinds(), 32);
    }

    #[test]
    fn test_random_size_respects_class_bounds() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let size = random_size(&mut rng);
            assert!(size >= 1 && size <= LARGE_OBJECT_THRESHOLD);
        }
    }

    #[test]
    fn test_relaxed_run_completes_and_cleans_up() {
        let manager = Arc::new(HeapManager::with_defaults());
        let workload = Workload::new(Arc::clone(&manager), 2).expect("workload");

        workload.run(2, 2, 2, SimulationMode::Relaxed);
        assert_eq!(manager.root_count(), 0);
    }
}
