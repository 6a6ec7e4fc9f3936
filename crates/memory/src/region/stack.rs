//! The region stack: thread-owned scope management
//!
//! One stack per thread, rooted at an implicit top-level region created
//! during initialization — an ordinary region at depth 0, not a hidden
//! global. Pushing creates a child of the current top; popping reclaims the
//! top's arena segments in bulk and retires its id.
//!
//! The stack also keeps a lineage ledger of every `(id, parent)` pair it
//! ever created. That ledger is the region topology a front-end hands to
//! the escape checker.

use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{AllocationHandle, Region, RegionId, RegionScope, RegionState};
use crate::error::{MemoryError, Result};
use crate::pool::ArenaPool;

/// Region stack configuration
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Capacity hint used when `enter` is called without one; also sizes
    /// the root region's first arena
    pub default_capacity: usize,
}

impl RegionConfig {
    /// Creates config with default values
    pub fn new() -> Self {
        Self {
            default_capacity: 64 * 1024, // 64KB
        }
    }

    /// Sets the default capacity hint
    #[must_use = "builder methods must be chained or built"]
    pub fn with_default_capacity(mut self, bytes: usize) -> Self {
        self.default_capacity = bytes;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.default_capacity == 0 {
            return Err(MemoryError::invalid_config(
                "default_capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-owned stack of active regions
///
/// The top of the stack is the default allocation target. The stack is
/// `Send` (a worker can carry its stack) but deliberately not `Sync`:
/// region nesting models a call/scope structure, never a shared resource.
/// The pool behind it is the shared piece.
#[derive(Debug)]
pub struct RegionStack {
    pool: Arc<ArenaPool>,
    stack: Vec<Region>,
    lineage: Vec<(RegionId, Option<RegionId>)>,
    config: RegionConfig,
}

impl RegionStack {
    /// Creates a stack with its root region, using the default configuration
    pub fn new(pool: Arc<ArenaPool>) -> Result<Self> {
        Self::with_config(pool, RegionConfig::default())
    }

    /// Creates a stack with its root region
    pub fn with_config(pool: Arc<ArenaPool>, config: RegionConfig) -> Result<Self> {
        config.validate()?;
        let arena = pool.acquire_at_least(config.default_capacity)?;
        let root = Region::new(RegionId::next(), None, 0, arena);
        trace!(root = %root.id(), "region stack initialized");
        let lineage = vec![(root.id(), None)];
        Ok(Self {
            pool,
            stack: vec![root],
            lineage,
            config,
        })
    }

    /// Enters a child region with the default capacity hint
    pub fn enter(&mut self) -> Result<RegionId> {
        self.enter_sized(self.config.default_capacity)
    }

    /// Enters a child region sized to `capacity_hint`
    pub fn enter_sized(&mut self, capacity_hint: usize) -> Result<RegionId> {
        let arena = self.pool.acquire_at_least(capacity_hint)?;
        let top = self.top();
        let region = Region::new(RegionId::next(), Some(top.id()), top.depth() + 1, arena);
        let id = region.id();
        trace!(region = %id, parent = %top.id(), depth = region.depth(), "enter region");
        self.lineage.push((id, region.parent()));
        self.stack.push(region);
        Ok(id)
    }

    /// Allocates `size` bytes at `align` in the current (top) region
    ///
    /// Exhaustion is absorbed by growth: the stack chains a new, larger
    /// arena onto the top region and retries. Nothing is copied — earlier
    /// segments stay where they are, so previously issued handles remain
    /// valid. Only a failed reservation surfaces an error.
    pub fn allocate_in_current(&mut self, size: usize, align: usize) -> Result<AllocationHandle> {
        match self.top_mut().allocate(size, align) {
            Ok(offset) => Ok(self.handle(offset, size, align)),
            Err(MemoryError::ArenaExhausted { .. }) => {
                self.grow_top(size)?;
                let offset = self.top_mut().allocate(size, align)?;
                Ok(self.handle(offset, size, align))
            }
            Err(err) => Err(err),
        }
    }

    /// Exits the current region
    ///
    /// Pops the top, releases all of its arena segments back to the pool,
    /// and retires its id. Exiting the root region is a caller bug and is
    /// rejected with [`MemoryError::PopRootViolation`].
    pub fn exit(&mut self) -> Result<()> {
        if self.stack.len() == 1 {
            return Err(MemoryError::PopRootViolation);
        }

        let region = self.stack.pop().expect("stack holds at least the root");
        trace!(
            region = %region.id(),
            segments = region.segment_count(),
            bytes_used = region.bytes_used(),
            "exit region"
        );
        for segment in region.into_segments() {
            self.pool.release(segment.arena);
        }
        Ok(())
    }

    /// Enters a region and returns an RAII guard that exits it on drop
    pub fn scope(&mut self) -> Result<RegionScope<'_>> {
        RegionScope::enter(self)
    }

    /// Enters a sized region and returns an RAII guard that exits it on drop
    pub fn scope_sized(&mut self, capacity_hint: usize) -> Result<RegionScope<'_>> {
        RegionScope::enter_sized(self, capacity_hint)
    }

    /// Id of the current (top) region
    pub fn current(&self) -> RegionId {
        self.top().id()
    }

    /// Nesting depth of the current region; the root is 0
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Lifecycle state of a region, `None` if this stack never created it
    pub fn state(&self, id: RegionId) -> Option<RegionState> {
        if self.top().id() == id {
            return Some(RegionState::Active);
        }
        if self.stack.iter().any(|r| r.id() == id) {
            return Some(RegionState::Suspended);
        }
        if self.lineage.iter().any(|(lid, _)| *lid == id) {
            return Some(RegionState::Retired);
        }
        None
    }

    /// Resolves a handle to a pointer
    ///
    /// `Some` only while the owning region is live on this stack; the
    /// pointer stays valid until that region exits. Handles from retired
    /// regions resolve to `None` — no access is defined post-exit.
    pub fn resolve(&self, handle: AllocationHandle) -> Option<NonNull<u8>> {
        let region = self.stack.iter().find(|r| r.id() == handle.region())?;
        region.resolve(handle.offset(), handle.size())
    }

    /// Every `(id, parent)` pair this stack has created, in creation order
    ///
    /// This is the region topology the escape checker consumes; retired
    /// regions are included so facts about them can still be judged.
    pub fn lineage(&self) -> &[(RegionId, Option<RegionId>)] {
        &self.lineage
    }

    /// The pool serving this stack
    pub fn pool(&self) -> &Arc<ArenaPool> {
        &self.pool
    }

    fn top(&self) -> &Region {
        self.stack.last().expect("stack holds at least the root")
    }

    fn top_mut(&mut self) -> &mut Region {
        self.stack.last_mut().expect("stack holds at least the root")
    }

    fn handle(&self, offset: usize, size: usize, align: usize) -> AllocationHandle {
        AllocationHandle::new(self.top().id(), offset, size, align)
    }

    /// Chains a larger arena onto the top region
    ///
    /// The new segment must fit the failed request from a zeroed cursor and
    /// at least double the active capacity, so repeated growth stays
    /// geometric.
    fn grow_top(&mut self, size: usize) -> Result<()> {
        let active = self.top().active_capacity();
        let target = size.max(active.saturating_mul(2));
        let arena = self.pool.acquire_at_least(target)?;
        debug!(
            region = %self.top().id(),
            active_capacity = active,
            new_capacity = arena.capacity(),
            "growing region with a fresh segment"
        );
        self.top_mut().grow(arena);
        Ok(())
    }
}

impl Drop for RegionStack {
    fn drop(&mut self) {
        // Root included: the stack owns every live region's segments.
        while let Some(region) = self.stack.pop() {
            for segment in region.into_segments() {
                self.pool.release(segment.arena);
            }
        }
    }
}
