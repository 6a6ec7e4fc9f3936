//! Address space reservoir
//!
//! Reserves large, demand-backed address ranges from the platform and hands
//! them out as fixed-capacity [`AddressSlice`]s. Reservations are rounded up
//! to power-of-two capacity classes so idle slices can later be matched by
//! class without any fragmentation bookkeeping.
//!
//! Reservoir calls are rare — once per pool miss, not per allocation — so
//! the only shared state here is a handful of statistics counters.

use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::debug;

use crate::error::{MemoryError, Result};

mod sys;

/// Largest supported capacity class: 2^46 bytes (64 TiB) of address space.
pub(crate) const MAX_CLASS_LOG2: u32 = 46;

/// Power-of-two reservation size class
///
/// Stored as the log2 of the class's byte size. Two slices of the same class
/// are interchangeable, which is what lets the allocator pool recycle them
/// with a plain per-class bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapacityClass {
    log2: u32,
}

impl CapacityClass {
    pub(crate) fn from_log2(log2: u32) -> Self {
        debug_assert!(log2 <= MAX_CLASS_LOG2);
        Self { log2 }
    }

    /// Byte capacity of this class
    #[inline]
    pub fn bytes(self) -> usize {
        1usize << self.log2
    }

    /// Log2 of the byte capacity
    #[inline]
    pub fn log2(self) -> u32 {
        self.log2
    }
}

/// One reserved, contiguous address range
///
/// Produced by the [`Reservoir`]; immutable once issued. Exactly one
/// [`Arena`](crate::arena::Arena) owns a given slice at a time. The slice
/// owns its mapping and releases it on drop.
#[derive(Debug)]
pub struct AddressSlice {
    base: NonNull<u8>,
    capacity: usize,
}

// SAFETY: AddressSlice exclusively owns its mapping; nothing else aliases
// the range until the slice is dropped, so moving it between threads is
// sound. It is deliberately not Sync — concurrent access is the owning
// arena's problem, and arenas are single-owner.
unsafe impl Send for AddressSlice {}

impl AddressSlice {
    fn new(base: NonNull<u8>, capacity: usize) -> Self {
        Self { base, capacity }
    }

    /// Base address of the range
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Total capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for AddressSlice {
    fn drop(&mut self) {
        if let Err(err) = sys::release(self.base, self.capacity) {
            // Nothing actionable at this point; the range stays leaked.
            debug!(capacity = self.capacity, %err, "address range release failed");
        }
    }
}

/// Reservation statistics
#[derive(Debug, Default)]
pub struct ReservoirStats {
    reservations: AtomicU64,
    releases: AtomicU64,
    reserved_bytes: AtomicUsize,
    peak_reserved_bytes: AtomicUsize,
}

impl ReservoirStats {
    /// Total reservations performed
    pub fn reservations(&self) -> u64 {
        self.reservations.load(Ordering::Relaxed)
    }

    /// Total releases performed
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    /// Address space currently reserved, in bytes
    pub fn reserved_bytes(&self) -> usize {
        self.reserved_bytes.load(Ordering::Relaxed)
    }

    /// High-water mark of reserved address space, in bytes
    pub fn peak_reserved_bytes(&self) -> usize {
        self.peak_reserved_bytes.load(Ordering::Relaxed)
    }

    fn record_reserve(&self, bytes: usize) {
        self.reservations.fetch_add(1, Ordering::Relaxed);
        let now = self.reserved_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak_reserved_bytes.fetch_max(now, Ordering::Relaxed);
    }

    fn record_release(&self, bytes: usize) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.reserved_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }
}

/// Reservoir configuration
#[derive(Debug, Clone)]
pub struct ReservoirConfig {
    /// Smallest capacity class, in bytes (must be a power of two)
    pub min_class_bytes: usize,
}

impl ReservoirConfig {
    /// Creates config with default values
    pub fn new() -> Self {
        Self {
            min_class_bytes: 64 * 1024, // 64KB
        }
    }

    /// Sets the smallest capacity class
    #[must_use = "builder methods must be chained or built"]
    pub fn with_min_class_bytes(mut self, bytes: usize) -> Self {
        self.min_class_bytes = bytes;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_class_bytes == 0 || !self.min_class_bytes.is_power_of_two() {
            return Err(MemoryError::invalid_config(
                "min_class_bytes must be a non-zero power of two",
            ));
        }
        if self.min_class_bytes.trailing_zeros() > MAX_CLASS_LOG2 {
            return Err(MemoryError::invalid_config(
                "min_class_bytes exceeds the largest capacity class",
            ));
        }
        Ok(())
    }
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Address space reservoir
///
/// Wraps the platform's reserve/release pair with class-rounding policy and
/// statistics. Never shares a slice between two live arenas: every call to
/// [`reserve`](Self::reserve) produces a freshly mapped range.
#[derive(Debug)]
pub struct Reservoir {
    config: ReservoirConfig,
    stats: ReservoirStats,
}

impl Reservoir {
    /// Creates a reservoir with the given configuration
    pub fn new(config: ReservoirConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stats: ReservoirStats::default(),
        })
    }

    /// Creates a reservoir with default configuration
    pub fn with_default() -> Self {
        Self {
            config: ReservoirConfig::default(),
            stats: ReservoirStats::default(),
        }
    }

    /// Smallest capacity class this reservoir hands out
    pub fn min_class(&self) -> CapacityClass {
        CapacityClass::from_log2(self.config.min_class_bytes.trailing_zeros())
    }

    /// Rounds a capacity request up to its class
    ///
    /// Fails with `OutOfAddressSpace` when the request exceeds the largest
    /// supported class — oversized requests cannot be satisfied any more
    /// than a failed mapping can.
    pub fn class_for(&self, min_capacity: usize) -> Result<CapacityClass> {
        let wanted = min_capacity.max(self.config.min_class_bytes);
        let rounded = wanted.checked_next_power_of_two().ok_or_else(|| {
            MemoryError::out_of_address_space(min_capacity, oversized_request())
        })?;
        let log2 = rounded.trailing_zeros();
        if log2 > MAX_CLASS_LOG2 {
            return Err(MemoryError::out_of_address_space(
                min_capacity,
                oversized_request(),
            ));
        }
        Ok(CapacityClass::from_log2(log2))
    }

    /// Reserves a slice of at least `min_capacity` bytes
    ///
    /// The returned slice's capacity is the request rounded up to its
    /// class. Pages are backed lazily; reserving far more than is touched
    /// is the intended usage.
    pub fn reserve(&self, min_capacity: usize) -> Result<AddressSlice> {
        let class = self.class_for(min_capacity)?;
        self.reserve_class(class)
    }

    /// Reserves a slice of exactly one capacity class
    pub fn reserve_class(&self, class: CapacityClass) -> Result<AddressSlice> {
        let bytes = class.bytes();
        let base = sys::reserve(bytes)
            .map_err(|source| MemoryError::out_of_address_space(bytes, source))?;
        self.stats.record_reserve(bytes);
        debug!(class = class.log2(), bytes, "reserved address slice");
        Ok(AddressSlice::new(base, bytes))
    }

    /// Returns a slice's range to the operating system
    pub fn release(&self, slice: AddressSlice) {
        self.stats.record_release(slice.capacity());
        debug!(bytes = slice.capacity(), "released address slice");
        drop(slice);
    }

    /// Reservation statistics
    pub fn stats(&self) -> &ReservoirStats {
        &self.stats
    }
}

fn oversized_request() -> io::Error {
    io::Error::new(
        io::ErrorKind::OutOfMemory,
        "request exceeds the largest capacity class",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_rounding() {
        let reservoir = Reservoir::with_default();

        // Everything at or below the minimum lands in the minimum class.
        assert_eq!(reservoir.class_for(1).unwrap().bytes(), 64 * 1024);
        assert_eq!(reservoir.class_for(64 * 1024).unwrap().bytes(), 64 * 1024);

        // One past a class boundary rounds to the next class.
        assert_eq!(
            reservoir.class_for(64 * 1024 + 1).unwrap().bytes(),
            128 * 1024
        );
        assert_eq!(
            reservoir.class_for(1024 * 1024).unwrap().bytes(),
            1024 * 1024
        );
    }

    #[test]
    fn oversized_request_is_out_of_address_space() {
        let reservoir = Reservoir::with_default();
        let err = reservoir.class_for(1usize << 60).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfAddressSpace { .. }));
    }

    #[test]
    fn reserve_tracks_stats() {
        let reservoir = Reservoir::with_default();
        let slice = reservoir.reserve(1).unwrap();

        assert_eq!(reservoir.stats().reservations(), 1);
        assert_eq!(reservoir.stats().reserved_bytes(), slice.capacity());

        reservoir.release(slice);
        assert_eq!(reservoir.stats().releases(), 1);
        assert_eq!(reservoir.stats().reserved_bytes(), 0);
        assert_eq!(reservoir.stats().peak_reserved_bytes(), 64 * 1024);
    }

    #[test]
    fn slices_never_alias() {
        let reservoir = Reservoir::with_default();
        let a = reservoir.reserve(4096).unwrap();
        let b = reservoir.reserve(4096).unwrap();

        let (a_start, a_end) = (a.base().as_ptr() as usize, a.base().as_ptr() as usize + a.capacity());
        let (b_start, b_end) = (b.base().as_ptr() as usize, b.base().as_ptr() as usize + b.capacity());
        assert!(a_end <= b_start || b_end <= a_start);

        reservoir.release(a);
        reservoir.release(b);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = ReservoirConfig::new().with_min_class_bytes(3000);
        assert!(matches!(
            Reservoir::new(config),
            Err(MemoryError::InvalidConfig { .. })
        ));
    }
}
