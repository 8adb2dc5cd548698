//! Sorted address table with fixed-increment capacity.
//!
//! [`RegistryTable`] is the unlocked core of the registry. It keeps its
//! entries sorted by [`Addr`] in a `SmallVec` whose inline buffer holds the
//! first [`INLINE_CAPACITY`] entries, so a process that never has more than
//! that many arrays alive never touches the heap for bookkeeping.
//!
//! Capacity changes only in whole [`RegistryConfig::increment`] steps and
//! returns to the inline buffer when the table drains.

use std::cmp::Ordering;
use std::mem;

use smallvec::SmallVec;

use ndmalloc_core::{Addr, Clue, NdError};

use crate::config::RegistryConfig;

/// Number of entries stored inline before the table spills to the heap.
pub const INLINE_CAPACITY: usize = 512;

/// One registered key and its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<V> {
    /// The registered address.
    pub key: Addr,
    /// Metadata attached to the address.
    pub value: V,
}

/// Sorted map from [`Addr`] to `V` with hinted lookup.
///
/// Not synchronized; wrap in a [`PointerRegistry`](crate::PointerRegistry)
/// for shared use.
#[derive(Debug)]
pub struct RegistryTable<V> {
    entries: SmallVec<[Entry<V>; INLINE_CAPACITY]>,
    config: RegistryConfig,
}

impl<V> RegistryTable<V> {
    /// Create an empty table with the default config.
    pub fn new() -> Self {
        Self {
            entries: SmallVec::new(),
            config: RegistryConfig::default(),
        }
    }

    /// Create an empty table with a validated config.
    pub fn with_config(config: RegistryConfig) -> Result<Self, NdError> {
        config.validate()?;
        Ok(Self {
            entries: SmallVec::new(),
            config,
        })
    }

    /// The capacity policy in use.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries the table can hold without growing.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Whether entries currently live on the heap rather than inline.
    pub fn is_spilled(&self) -> bool {
        self.entries.spilled()
    }

    /// Registered keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = Addr> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    /// Registered entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (Addr, &V)> + '_ {
        self.entries.iter().map(|e| (e.key, &e.value))
    }

    /// Current slot of `key`, usable as a fresh clue.
    pub fn position(&self, key: Addr, clue: Option<Clue>) -> Option<Clue> {
        self.search(key, clue).ok().map(Clue::new)
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: Addr) -> bool {
        self.search(key, None).is_ok()
    }

    /// Value registered for `key`, if any.
    pub fn get(&self, key: Addr, clue: Option<Clue>) -> Option<&V> {
        self.search(key, clue).ok().map(|i| &self.entries[i].value)
    }

    /// Mutable access to the value registered for `key`.
    pub fn get_mut(&mut self, key: Addr, clue: Option<Clue>) -> Option<&mut V> {
        match self.search(key, clue) {
            Ok(i) => Some(&mut self.entries[i].value),
            Err(_) => None,
        }
    }

    /// Value registered for `key`, or [`NdError::NotFound`].
    pub fn lookup(&self, key: Addr, clue: Option<Clue>) -> Result<&V, NdError> {
        self.get(key, clue).ok_or(NdError::NotFound { addr: key })
    }

    /// Ensure room for `additional` more entries without further growth.
    ///
    /// Capacity is raised by as many whole increments as needed. On failure
    /// the table is unchanged. Callers that must insert several keys as a
    /// unit reserve first so that no insertion in the group can fail on
    /// growth.
    pub fn reserve(&mut self, additional: usize) -> Result<(), NdError> {
        let capacity = self.entries.capacity();
        let needed = self
            .entries
            .len()
            .checked_add(additional)
            .ok_or(NdError::AllocationFailed {
                requested: usize::MAX,
            })?;
        if needed <= capacity {
            return Ok(());
        }
        let increment = self.config.increment;
        let target = (needed - capacity)
            .div_ceil(increment)
            .checked_mul(increment)
            .and_then(|extra| capacity.checked_add(extra))
            .ok_or(NdError::AllocationFailed {
                requested: usize::MAX,
            })?;
        self.entries
            .try_grow(target)
            .map_err(|_| NdError::AllocationFailed {
                requested: target.saturating_mul(mem::size_of::<Entry<V>>()),
            })?;
        tracing::debug!(from = capacity, to = target, len = self.len(), "registry grew");
        Ok(())
    }

    /// Register `key` with `value` and return its slot as a clue.
    ///
    /// Fails with [`NdError::Duplicate`] if the key is present, with
    /// [`NdError::InvalidOperation`] for the null address, and with
    /// [`NdError::AllocationFailed`] if the table cannot grow. The table is
    /// unchanged on any failure.
    pub fn insert(&mut self, key: Addr, value: V) -> Result<Clue, NdError> {
        if key.is_null() {
            return Err(NdError::invalid("the null address cannot be registered"));
        }
        let index = match self.search(key, None) {
            Ok(_) => return Err(NdError::Duplicate { addr: key }),
            Err(index) => index,
        };
        self.reserve(1)?;
        self.entries.insert(index, Entry { key, value });
        Ok(Clue::new(index))
    }

    /// Unregister `key` and return its value.
    ///
    /// Fails with [`NdError::NotFound`] if the key is absent, leaving the
    /// table unchanged. May give back one increment of capacity.
    pub fn remove(&mut self, key: Addr, clue: Option<Clue>) -> Result<V, NdError> {
        let index = self
            .search(key, clue)
            .map_err(|_| NdError::NotFound { addr: key })?;
        let entry = self.entries.remove(index);
        self.shrink_if_sparse();
        Ok(entry.value)
    }

    fn shrink_if_sparse(&mut self) {
        let capacity = self.entries.capacity();
        if capacity <= INLINE_CAPACITY {
            return;
        }
        if self.entries.len() + self.config.shrink_slack() >= capacity {
            return;
        }
        // Capacity above the inline buffer is always INLINE + k * increment.
        let target = capacity - self.config.increment;
        match self.entries.try_grow(target) {
            Ok(()) => {
                tracing::debug!(from = capacity, to = target, len = self.len(), "registry shrank");
            }
            // Keeping the larger buffer is always valid.
            Err(_) => tracing::debug!(capacity, target, "registry shrink skipped"),
        }
    }

    /// Locate `key`: `Ok(slot)` if present, `Err(insertion point)` if not.
    ///
    /// Probes the clue slot first (clamped into range), or the midpoint
    /// without one, then the adjacent slot on the key's side, then bisects
    /// the remaining half.
    fn search(&self, key: Addr, clue: Option<Clue>) -> Result<usize, usize> {
        let len = self.entries.len();
        if len == 0 {
            return Err(0);
        }
        let guess = clue.map_or(len / 2, |c| c.index().min(len - 1));
        match self.entries[guess].key.cmp(&key) {
            Ordering::Equal => Ok(guess),
            Ordering::Less => {
                let lo = guess + 1;
                if self.entries.get(lo).is_some_and(|e| e.key == key) {
                    return Ok(lo);
                }
                self.entries[lo..]
                    .binary_search_by_key(&key, |e| e.key)
                    .map(|i| i + lo)
                    .map_err(|i| i + lo)
            }
            Ordering::Greater => {
                if guess > 0 && self.entries[guess - 1].key == key {
                    return Ok(guess - 1);
                }
                self.entries[..guess].binary_search_by_key(&key, |e| e.key)
            }
        }
    }
}

impl<V> Default for RegistryTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
