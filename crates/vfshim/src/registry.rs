//! Ordered set of registered backends.
//!
//! Registration order is dispatch priority: the first backend that claims a
//! path answers for it. Writers swap in a fresh snapshot under a short lock,
//! so a dispatch in flight keeps iterating the list it started with.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::backend::VfsBackend;

/// Immutable view of the registry at one instant.
pub type Snapshot = Arc<[Arc<dyn VfsBackend>]>;

/// Backend registry.
pub struct Registry {
    backends: RwLock<Snapshot>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|b| format!("{}({})", b.name(), b.policy()))
            .collect();
        f.debug_struct("Registry").field("backends", &names).finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn same(a: &Arc<dyn VfsBackend>, b: &Arc<dyn VfsBackend>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Append `backend` at lowest priority.
    ///
    /// Returns `false` (and changes nothing) if this exact backend is
    /// already registered.
    pub fn register(&self, backend: Arc<dyn VfsBackend>) -> bool {
        let mut guard = self.backends.write();
        if guard.iter().any(|b| same(b, &backend)) {
            return false;
        }
        let mut next: Vec<_> = guard.iter().cloned().collect();
        next.push(backend);
        *guard = Arc::from(next);
        true
    }

    /// Remove `backend`. Returns `false` if it was not registered.
    pub fn unregister(&self, backend: &Arc<dyn VfsBackend>) -> bool {
        let mut guard = self.backends.write();
        let before = guard.len();
        let next: Vec<_> = guard.iter().filter(|b| !same(b, backend)).cloned().collect();
        if next.len() == before {
            return false;
        }
        *guard = Arc::from(next);
        true
    }

    /// Current backends in priority order.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.backends.read())
    }

    /// Whether `backend` is registered.
    pub fn contains(&self, backend: &Arc<dyn VfsBackend>) -> bool {
        self.backends.read().iter().any(|b| same(b, backend))
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.read().is_empty()
    }
}
