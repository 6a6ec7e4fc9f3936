//! RAII guard for region scopes
//!
//! Ties a region's lifetime to a lexical scope: entering happens at
//! construction, exit at drop. The guard borrows the stack exclusively, so
//! the region it entered is guaranteed to still be the top when it exits.

use tracing::debug;

use super::{AllocationHandle, RegionId, RegionStack};
use crate::error::Result;

/// Guard that exits its region when dropped
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use strata_memory::{ArenaPool, RegionStack};
///
/// let mut stack = RegionStack::new(Arc::new(ArenaPool::with_default())).unwrap();
/// let before = stack.depth();
/// {
///     let mut scope = stack.scope().unwrap();
///     let handle = scope.allocate(64, 8).unwrap();
///     assert_eq!(handle.region(), scope.id());
///     // Region exits here
/// }
/// assert_eq!(stack.depth(), before);
/// ```
#[derive(Debug)]
pub struct RegionScope<'a> {
    stack: &'a mut RegionStack,
    id: RegionId,
}

impl<'a> RegionScope<'a> {
    pub(super) fn enter(stack: &'a mut RegionStack) -> Result<Self> {
        let id = stack.enter()?;
        Ok(Self { stack, id })
    }

    pub(super) fn enter_sized(stack: &'a mut RegionStack, capacity_hint: usize) -> Result<Self> {
        let id = stack.enter_sized(capacity_hint)?;
        Ok(Self { stack, id })
    }

    /// Id of the region this guard entered
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Allocates in the guarded region
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<AllocationHandle> {
        self.stack.allocate_in_current(size, align)
    }
}

impl Drop for RegionScope<'_> {
    fn drop(&mut self) {
        // The guard holds the stack exclusively and only ever entered a
        // child, so exit can only fail if the stack was corrupted.
        if let Err(err) = self.stack.exit() {
            debug!(region = %self.id, %err, "region scope exit failed");
        }
    }
}
