//! Registry configuration parameters.

use ndmalloc_core::NdError;

/// Configuration for the registry's capacity policy.
///
/// The initial capacity is fixed by the inline buffer
/// ([`INLINE_CAPACITY`](crate::INLINE_CAPACITY)). Beyond it the table grows
/// and shrinks in whole increments so that a burst of short-lived arrays
/// does not reallocate on every insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Number of entries added on each growth step and removed on each
    /// shrink step.
    ///
    /// Default: 512. Must be at least 1.
    pub increment: usize,
}

impl RegistryConfig {
    /// Default growth increment, equal to the inline capacity.
    pub const DEFAULT_INCREMENT: usize = 512;

    /// Create a config with the given increment.
    pub fn new(increment: usize) -> Self {
        Self { increment }
    }

    /// Check the config's invariants.
    pub fn validate(&self) -> Result<(), NdError> {
        if self.increment == 0 {
            return Err(NdError::invalid("registry increment must be at least 1"));
        }
        Ok(())
    }

    /// Free slots that must exist beyond one whole increment before the
    /// table gives an increment back.
    ///
    /// A table of capacity `c` shrinks once `len < c - increment -
    /// increment / 6`, i.e. when occupancy drops to roughly six sevenths
    /// of the next lower capacity. The hysteresis keeps a workload that
    /// hovers around a boundary from reallocating on every call.
    pub fn shrink_slack(&self) -> usize {
        self.increment + self.increment / 6
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INCREMENT)
    }
}
