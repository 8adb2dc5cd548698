//! Thread-safe registry wrapper and the process-wide instance.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use ndmalloc_core::{Addr, ArrayRecord, Clue, NdError};

use crate::config::RegistryConfig;
use crate::table::RegistryTable;

/// A [`RegistryTable`] behind a mutex.
///
/// Every operation takes the lock for its full duration, so concurrent
/// registrations and removals serialize and no reader observes a
/// half-updated table. Callers that need several operations to appear
/// atomic hold the guard from [`lock`](Self::lock) across them.
///
/// A panic while the lock is held poisons it; the table itself is never
/// left mid-mutation (every mutation is a single `SmallVec` call), so the
/// poison flag is cleared and the table reused.
#[derive(Debug)]
pub struct PointerRegistry<V = ArrayRecord> {
    table: Mutex<RegistryTable<V>>,
}

static GLOBAL: OnceLock<Arc<PointerRegistry>> = OnceLock::new();

impl PointerRegistry {
    /// The process-wide registry, created on first use with the default
    /// config.
    pub fn global() -> &'static Arc<PointerRegistry> {
        GLOBAL.get_or_init(|| Arc::new(PointerRegistry::new()))
    }
}

impl<V> PointerRegistry<V> {
    /// Create an empty registry with the default config.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(RegistryTable::new()),
        }
    }

    /// Create an empty registry with a validated config.
    pub fn with_config(config: RegistryConfig) -> Result<Self, NdError> {
        Ok(Self {
            table: Mutex::new(RegistryTable::with_config(config)?),
        })
    }

    /// Acquire the table for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, RegistryTable<V>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `key` with `value`. See [`RegistryTable::insert`].
    pub fn insert(&self, key: Addr, value: V) -> Result<Clue, NdError> {
        self.lock().insert(key, value)
    }

    /// Unregister `key`. See [`RegistryTable::remove`].
    pub fn remove(&self, key: Addr, clue: Option<Clue>) -> Result<V, NdError> {
        self.lock().remove(key, clue)
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: Addr) -> bool {
        self.lock().contains(key)
    }

    /// Run `f` on the value registered for `key` while the lock is held.
    pub fn with<R>(
        &self,
        key: Addr,
        clue: Option<Clue>,
        f: impl FnOnce(&V) -> R,
    ) -> Result<R, NdError> {
        self.lock().lookup(key, clue).map(f)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current capacity of the underlying table.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }
}

impl<V: Clone> PointerRegistry<V> {
    /// A copy of the value registered for `key`.
    pub fn lookup(&self, key: Addr, clue: Option<Clue>) -> Result<V, NdError> {
        self.lock().lookup(key, clue).cloned()
    }
}

impl<V> Default for PointerRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}
