//! Thread-local stacks of scoped variable bindings.

use super::RootError;
use crate::heap::BlockHeader;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::ptr::NonNull;

/// One named binding on a thread-local stack.
struct TlsEntry {
    /// Variable name, unique across the whole stack.
    name: String,
    /// Scope the variable was declared in.
    scope: usize,
    /// Referenced block, if the variable is currently bound.
    block: Option<NonNull<BlockHeader>>,
}

struct TlsInner {
    /// Id of the innermost scope. Scope 0 is the destruction sentinel.
    scope: usize,
    /// Declared variables, innermost scope on top.
    entries: Vec<TlsEntry>,
    /// Variable name to position in `entries`, for O(1) rebinding.
    index: FxHashMap<String, usize>,
}

/// Simulated thread-local memory: a stack of lexical scopes holding named
/// references to heap blocks.
///
/// Variables are declared with [`init`](ThreadLocalStack::init), rebound
/// in place, and dropped in bulk when their scope is popped. The marker
/// visits every entry under the stack's internal lock.
pub struct ThreadLocalStack {
    inner: Mutex<TlsInner>,
}

impl ThreadLocalStack {
    /// Create a stack with one open scope and no bindings.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a stack pre-sizing the name index for `capacity` bindings.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TlsInner {
                scope: 1,
                entries: Vec::new(),
                index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            }),
        }
    }

    /// Enter a new scope.
    pub fn push_scope(&self) {
        self.inner.lock().scope += 1;
    }

    /// Leave the current scope, dropping every binding declared in it.
    ///
    /// Popping the outermost scope is a no-op; only destruction closes it.
    pub fn pop_scope(&self) {
        self.pop_scope_inner(false);
    }

    fn pop_scope_inner(&self, finalizing: bool) {
        let mut inner = self.inner.lock();
        if (inner.scope <= 1 && !finalizing) || inner.scope == 0 {
            return;
        }

        while inner
            .entries
            .last()
            .is_some_and(|entry| entry.scope == inner.scope)
        {
            if let Some(entry) = inner.entries.pop() {
                inner.index.remove(&entry.name);
            }
        }
        inner.scope -= 1;
    }

    /// Declare a new variable in the current scope.
    pub fn init(
        &self,
        name: impl Into<String>,
        block: Option<NonNull<BlockHeader>>,
    ) -> Result<(), RootError> {
        let name = name.into();
        let mut inner = self.inner.lock();

        if inner.index.contains_key(&name) {
            return Err(RootError::DuplicateName(name));
        }

        let position = inner.entries.len();
        let scope = inner.scope;
        inner.entries.push(TlsEntry {
            name: name.clone(),
            scope,
            block,
        });
        inner.index.insert(name, position);
        Ok(())
    }

    /// Rebind an existing variable to a new block.
    pub fn rebind(&self, name: &str, block: NonNull<BlockHeader>) -> Result<(), RootError> {
        self.assign(name, Some(block))
    }

    /// Drop an existing variable's reference without removing the binding.
    pub fn clear(&self, name: &str) -> Result<(), RootError> {
        self.assign(name, None)
    }

    fn assign(&self, name: &str, block: Option<NonNull<BlockHeader>>) -> Result<(), RootError> {
        let mut inner = self.inner.lock();
        let Some(&position) = inner.index.get(name) else {
            return Err(RootError::UnknownName(name.to_owned()));
        };
        inner.entries[position].block = block;
        Ok(())
    }

    /// Id of the innermost scope.
    pub fn scope(&self) -> usize {
        self.inner.lock().scope
    }

    /// Number of live bindings across all scopes.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check whether the stack has no bindings.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Mark every referenced block live. Runs under the stack's lock.
    pub(crate) fn mark_live(&self) {
        let inner = self.inner.lock();
        for entry in &inner.entries {
            if let Some(block) = entry.block {
                unsafe { block.as_ref() }.set_marked(true);
            }
        }
    }
}

impl Default for ThreadLocalStack {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadLocalStack {
    fn drop(&mut self) {
        self.pop_scope_inner(true);
    }
}

// Safety: every access to the entry stack and the referenced block
// pointers goes through the internal lock; block flags are atomic.
unsafe impl Send for ThreadLocalStack {}
unsafe impl Sync for ThreadLocalStack {}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_block(header: &mut BlockHeader) -> NonNull<BlockHeader> {
        NonNull::from(header)
    }

    #[test]
    fn test_initial_state() {
        let tls = ThreadLocalStack::new();
        assert_eq!(tls.scope(), 1);
        assert!(tls.is_empty());
    }

    #[test]
    fn test_duplicate_init_rejected() {
        let tls = ThreadLocalStack::new();
        tls.init("v", None).expect("first init");

        let err = tls.init("v", None).unwrap_err();
        assert_eq!(err, RootError::DuplicateName("v".to_owned()));
        assert_eq!(tls.len(), 1);
    }

    #[test]
    fn test_rebind_and_clear() {
        let mut header = BlockHeader::free_block(32, std::ptr::null_mut());
        let tls = ThreadLocalStack::new();

        tls.init("x", None).expect("init");
        tls.rebind("x", fake_block(&mut header)).expect("rebind");
        tls.clear("x").expect("clear");

        assert_eq!(
            tls.rebind("y", fake_block(&mut header)),
            Err(RootError::UnknownName("y".to_owned()))
        );
        assert_eq!(tls.clear("y"), Err(RootError::UnknownName("y".to_owned())));
    }

    #[test]
    fn test_pop_scope_drops_scoped_bindings() {
        let tls = ThreadLocalStack::new();
        tls.init("outer", None).expect("init");

        tls.push_scope();
        tls.init("inner_a", None).expect("init");
        tls.init("inner_b", None).expect("init");
        assert_eq!(tls.len(), 3);

        tls.pop_scope();
        assert_eq!(tls.len(), 1);
        assert_eq!(tls.scope(), 1);

        // Popped names become declarable again.
        tls.push_scope();
        tls.init("inner_a", None).expect("re-init after pop");
    }

    #[test]
    fn test_matched_push_pop_restores_state() {
        let tls = ThreadLocalStack::new();
        tls.init("base", None).expect("init");
        let (scope_before, len_before) = (tls.scope(), tls.len());

        tls.push_scope();
        tls.init("scratch", None).expect("init");
        tls.pop_scope();

        assert_eq!(tls.scope(), scope_before);
        assert_eq!(tls.len(), len_before);
        assert!(tls.clear("scratch").is_err());
        assert!(tls.clear("base").is_ok());
    }

    #[test]
    fn test_pop_outermost_scope_is_noop() {
        let tls = ThreadLocalStack::new();
        tls.init("v", None).expect("init");

        tls.pop_scope();
        assert_eq!(tls.scope(), 1);
        assert_eq!(tls.len(), 1);
    }

    #[test]
    fn test_mark_live_sets_marked_flag() {
        let mut header = BlockHeader::free_block(32, std::ptr::null_mut());
        header.set_free(false);
        let tls = ThreadLocalStack::new();
        tls.init("v", Some(fake_block(&mut header))).expect("init");

        tls.mark_live();
        assert!(header.is_marked());
    }
}
