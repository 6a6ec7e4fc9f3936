//! Allocator pool: idle-arena recycling keyed by capacity class
//!
//! Regions are short-lived; address-space reservations are not meant to be.
//! The pool sits between them: on region exit an arena is reset and parked
//! in its class bucket, and the next region enter of the same class reuses
//! it without touching the reservoir. Many fine-grained scopes therefore
//! pay the reservation cost only once per class, not once per scope.
//!
//! The pool is the shared piece of the runtime: one instance behind an
//! [`Arc`](std::sync::Arc) serves every thread's region stack. Each
//! capacity class has its own bucket lock, and pool traffic is one
//! acquire/release pair per region, so contention stays off the
//! per-allocation path entirely.

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::error::Result;
use crate::reservoir::{CapacityClass, MAX_CLASS_LOG2, Reservoir, ReservoirConfig};

mod stats;

pub use stats::PoolStats;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle arenas retained per capacity class before releases start going
    /// back to the reservoir
    pub max_idle_per_class: usize,
}

impl PoolConfig {
    /// Creates config with default values
    pub fn new() -> Self {
        Self {
            max_idle_per_class: 4,
        }
    }

    /// Sets the idle ceiling per class
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_idle_per_class(mut self, ceiling: usize) -> Self {
        self.max_idle_per_class = ceiling;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared pool of idle arenas, one bucket per capacity class
#[derive(Debug)]
pub struct ArenaPool {
    reservoir: Reservoir,
    buckets: Box<[Mutex<Vec<Arena>>]>,
    config: PoolConfig,
    stats: PoolStats,
}

impl ArenaPool {
    /// Creates a pool over the given reservoir
    pub fn new(reservoir: Reservoir, config: PoolConfig) -> Self {
        let classes = (MAX_CLASS_LOG2 - reservoir.min_class().log2() + 1) as usize;
        let buckets = (0..classes)
            .map(|_| Mutex::new(Vec::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            reservoir,
            buckets,
            config,
            stats: PoolStats::default(),
        }
    }

    /// Creates a pool with default reservoir and pool configuration
    pub fn with_default() -> Self {
        Self::new(Reservoir::with_default(), PoolConfig::default())
    }

    /// Creates a pool with a custom reservoir configuration
    pub fn with_reservoir_config(config: ReservoirConfig) -> Result<Self> {
        Ok(Self::new(Reservoir::new(config)?, PoolConfig::default()))
    }

    /// Rounds a capacity request up to its class
    pub fn class_for(&self, min_capacity: usize) -> Result<CapacityClass> {
        self.reservoir.class_for(min_capacity)
    }

    /// Acquires an arena of the given class
    ///
    /// Pool hit: an idle, already-reset arena from the class bucket.
    /// Pool miss: a fresh reservation delegated to the reservoir.
    pub fn acquire(&self, class: CapacityClass) -> Result<Arena> {
        if let Some(arena) = self.bucket(class).lock().pop() {
            debug_assert_eq!(arena.cursor(), 0);
            self.stats.record_hit();
            trace!(class = class.log2(), "pool hit");
            return Ok(arena);
        }

        self.stats.record_miss();
        debug!(class = class.log2(), "pool miss, delegating to reservoir");
        let slice = self.reservoir.reserve_class(class)?;
        Ok(Arena::new(slice))
    }

    /// Acquires an arena of at least `min_capacity` bytes
    pub fn acquire_at_least(&self, min_capacity: usize) -> Result<Arena> {
        self.acquire(self.class_for(min_capacity)?)
    }

    /// Resets an arena and returns it to its class bucket
    ///
    /// Once the bucket holds [`PoolConfig::max_idle_per_class`] arenas, the
    /// slice goes back to the reservoir instead, bounding idle memory.
    pub fn release(&self, mut arena: Arena) {
        arena.reset();
        let class = class_of(&arena);

        {
            let mut bucket = self.bucket(class).lock();
            if bucket.len() < self.config.max_idle_per_class {
                bucket.push(arena);
                self.stats.record_release(false);
                trace!(class = class.log2(), "arena parked in pool");
                return;
            }
        }

        self.stats.record_release(true);
        debug!(class = class.log2(), "bucket full, releasing to reservoir");
        self.reservoir.release(arena.into_slice());
    }

    /// Idle arenas currently parked for a class
    pub fn idle_count(&self, class: CapacityClass) -> usize {
        self.bucket(class).lock().len()
    }

    /// Pool operation statistics
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// The underlying reservoir
    pub fn reservoir(&self) -> &Reservoir {
        &self.reservoir
    }

    fn bucket(&self, class: CapacityClass) -> &Mutex<Vec<Arena>> {
        let index = (class.log2() - self.reservoir.min_class().log2()) as usize;
        debug_assert!(index < self.buckets.len());
        &self.buckets[index]
    }
}

fn class_of(arena: &Arena) -> CapacityClass {
    // Arena capacities are always exact class sizes: the reservoir rounds
    // every reservation before mapping it.
    debug_assert!(arena.capacity().is_power_of_two());
    CapacityClass::from_log2(arena.capacity().trailing_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_reuses_arena() {
        let pool = ArenaPool::with_default();
        let class = pool.class_for(4096).unwrap();

        let mut arena = pool.acquire(class).unwrap();
        let base = arena.base().as_ptr() as usize;
        arena.allocate(128, 8).unwrap();
        pool.release(arena);

        assert_eq!(pool.idle_count(class), 1);

        let arena = pool.acquire(class).unwrap();
        assert_eq!(arena.base().as_ptr() as usize, base);
        assert_eq!(arena.cursor(), 0);

        assert_eq!(pool.stats().hits(), 1);
        assert_eq!(pool.stats().misses(), 1);
        pool.release(arena);
    }

    #[test]
    fn idle_ceiling_evicts_to_reservoir() {
        let pool = ArenaPool::new(
            Reservoir::with_default(),
            PoolConfig::new().with_max_idle_per_class(1),
        );
        let class = pool.class_for(1).unwrap();

        let a = pool.acquire(class).unwrap();
        let b = pool.acquire(class).unwrap();
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.idle_count(class), 1);
        assert_eq!(pool.stats().evictions(), 1);
        assert_eq!(pool.reservoir().stats().releases(), 1);
    }

    #[test]
    fn classes_bucket_independently() {
        let pool = ArenaPool::with_default();
        let small = pool.class_for(1).unwrap();
        let large = pool.class_for(1024 * 1024).unwrap();
        assert_ne!(small, large);

        let a = pool.acquire(small).unwrap();
        let b = pool.acquire(large).unwrap();
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.idle_count(small), 1);
        assert_eq!(pool.idle_count(large), 1);

        // Acquiring the large class must not drain the small bucket.
        let b = pool.acquire(large).unwrap();
        assert_eq!(pool.idle_count(small), 1);
        assert_eq!(pool.idle_count(large), 0);
        pool.release(b);
    }

    #[test]
    fn concurrent_acquire_release() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(ArenaPool::with_default());
        let mut handles = vec![];

        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for _ in 0..32 {
                    let mut arena = pool.acquire_at_least(4096).unwrap();
                    let off = arena.allocate(64, 8).unwrap();
                    assert_eq!(off, 0);
                    pool.release(arena);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.stats().acquires(), 8 * 32);
    }
}
