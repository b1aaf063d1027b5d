//! Named registry of root-set entries.

use super::Root;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Registry mapping string keys to root-set entries.
///
/// All mutations go through a single registry-wide lock. The collector
/// holds that lock for the whole stop-the-world cycle via
/// [`RootRegistry::lock`], so roots cannot be added or removed while the
/// marker walks them.
pub struct RootRegistry {
    roots: Mutex<FxHashMap<String, Arc<Root>>>,
}

impl RootRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            roots: Mutex::new(FxHashMap::default()),
        }
    }

    /// Insert a root under `key`, replacing any existing entry.
    ///
    /// Returns a handle to the inserted root.
    pub fn add_root(&self, key: impl Into<String>, root: Root) -> Arc<Root> {
        let root = Arc::new(root);
        self.roots.lock().insert(key.into(), Arc::clone(&root));
        root
    }

    /// Look up a root by key.
    pub fn get_root(&self, key: &str) -> Option<Arc<Root>> {
        self.roots.lock().get(key).cloned()
    }

    /// Remove the root registered under `key`, if any.
    pub fn remove_root(&self, key: &str) {
        self.roots.lock().remove(key);
    }

    /// Remove every registered root.
    pub fn clear(&self) {
        self.roots.lock().clear();
    }

    /// Number of registered roots.
    pub fn len(&self) -> usize {
        self.roots.lock().len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.roots.lock().is_empty()
    }

    /// Take the registry lock for the duration of a collection cycle.
    pub fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            roots: self.roots.lock(),
        }
    }
}

impl Default for RootRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive view of the registry, held across a collection cycle.
pub struct RegistryGuard<'a> {
    roots: MutexGuard<'a, FxHashMap<String, Arc<Root>>>,
}

impl RegistryGuard<'_> {
    /// Number of registered roots.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Iterate over the registered roots in unspecified order.
    pub fn roots(&self) -> impl Iterator<Item = &Arc<Root>> {
        self.roots.values()
    }
}
