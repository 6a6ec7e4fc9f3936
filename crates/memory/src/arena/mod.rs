//! Bump-pointer arena over one reserved address slice
//!
//! An [`Arena`] advances a cursor through its [`AddressSlice`] and never
//! hands the same bytes out twice until it is reset. There is no automatic
//! growth here: when an arena runs out, the region stack chains a fresh,
//! larger one (see [`crate::region`]), because growing in place would be
//! the wrong layer for that policy.
//!
//! ## Invariants
//!
//! - `0 <= cursor <= capacity` at all times
//! - the cursor only moves forward during allocation and snaps to 0 on reset
//! - previously returned offsets are never moved or reused while the cursor
//!   is ahead of them (no compaction)

use std::ptr::NonNull;

use crate::error::{MemoryError, Result};
use crate::reservoir::AddressSlice;
use crate::utils::align_up;

/// Bump allocator owning one address slice
///
/// Exclusively owned: by the region currently holding it, or by the
/// allocator pool while idle. All methods take `&mut self`; there is
/// nothing to synchronize on the allocation path.
#[derive(Debug)]
pub struct Arena {
    slice: AddressSlice,
    cursor: usize,
    high_water: usize,
    allocations: u64,
}

impl Arena {
    /// Wraps a reserved slice in a fresh arena
    pub fn new(slice: AddressSlice) -> Self {
        Self {
            slice,
            cursor: 0,
            high_water: 0,
            allocations: 0,
        }
    }

    /// Allocates `size` bytes at `align` and returns the offset
    ///
    /// The offset is relative to the slice base and stays valid for the
    /// arena's entire lifetime — allocation never moves earlier
    /// allocations. O(1).
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<usize> {
        if !align.is_power_of_two() {
            return Err(MemoryError::invalid_alignment(align));
        }

        // cursor <= capacity and align is bounded by the capacity classes,
        // so aligning the cursor itself cannot wrap; the payload size can.
        let aligned = align_up(self.cursor, align);
        let end = aligned.checked_add(size).ok_or(MemoryError::SizeOverflow)?;

        if end > self.slice.capacity() {
            return Err(MemoryError::arena_exhausted(
                self.slice.capacity(),
                self.cursor,
                size + (aligned - self.cursor),
            ));
        }

        self.cursor = end;
        self.high_water = self.high_water.max(end);
        self.allocations += 1;
        Ok(aligned)
    }

    /// Resets the arena: cursor to 0, diagnostics cleared
    ///
    /// Allocations are opaque bytes, so there is no per-allocation cleanup
    /// to run; all previously issued offsets become dead at once.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.high_water = 0;
        self.allocations = 0;
    }

    /// Total capacity of the owned slice
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slice.capacity()
    }

    /// Bytes remaining past the cursor
    #[inline]
    pub fn remaining(&self) -> usize {
        self.slice.capacity() - self.cursor
    }

    /// Current cursor position
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Highest cursor position reached since the last reset
    #[inline]
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Allocations performed since the last reset
    #[inline]
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Base address of the owned slice
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.slice.base()
    }

    /// Resolves an offset previously returned by [`allocate`](Self::allocate)
    ///
    /// The pointer is valid for reads and writes until the arena is reset
    /// or dropped; the caller is responsible for not holding it past that.
    #[inline]
    pub fn base_ptr(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.slice.capacity());
        // SAFETY: offset stays within the slice's reserved range
        // (debug-asserted; allocate() never returns an offset past
        // capacity), so the add lands inside the same mapping.
        unsafe { NonNull::new_unchecked(self.slice.base().as_ptr().add(offset)) }
    }

    /// Consumes the arena and returns its slice to the caller
    pub(crate) fn into_slice(self) -> AddressSlice {
        self.slice
    }
}
