//! Error types for the region allocator runtime

use std::io;

/// Result type for region allocator operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Region allocator errors
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The platform could not satisfy an address-space reservation.
    ///
    /// Fatal: address-space exhaustion does not resolve itself, so callers
    /// must not retry with the same request.
    #[error("address space reservation of {requested} bytes failed: {source}")]
    OutOfAddressSpace {
        /// Bytes requested from the reservoir, after class rounding
        requested: usize,
        /// Underlying platform error
        #[source]
        source: io::Error,
    },

    /// The arena has insufficient remaining capacity for the request.
    ///
    /// Handled internally by region growth; it only reaches callers that
    /// drive an [`Arena`](crate::arena::Arena) directly.
    #[error("arena exhausted: capacity {capacity}, cursor {cursor}, requested {requested}")]
    ArenaExhausted {
        /// Total capacity of the arena's slice
        capacity: usize,
        /// Cursor position at the time of the request
        cursor: usize,
        /// Bytes requested, including alignment padding
        requested: usize,
    },

    /// Attempted to exit the implicit root region.
    ///
    /// A programming-contract violation on the caller's side, not a
    /// resource condition.
    #[error("cannot exit the root region")]
    PopRootViolation,

    /// Alignment is not a power of two
    #[error("alignment {align} is not a power of two")]
    InvalidAlignment {
        /// The rejected alignment value
        align: usize,
    },

    /// Size arithmetic would overflow `usize`
    #[error("allocation size arithmetic overflowed")]
    SizeOverflow,

    /// Configuration failed validation
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable validation failure
        reason: &'static str,
    },
}

impl MemoryError {
    /// Create an out-of-address-space error
    pub fn out_of_address_space(requested: usize, source: io::Error) -> Self {
        Self::OutOfAddressSpace { requested, source }
    }

    /// Create an arena-exhausted error
    pub fn arena_exhausted(capacity: usize, cursor: usize, requested: usize) -> Self {
        Self::ArenaExhausted {
            capacity,
            cursor,
            requested,
        }
    }

    /// Create an invalid-alignment error
    pub fn invalid_alignment(align: usize) -> Self {
        Self::InvalidAlignment { align }
    }

    /// Create a configuration error
    pub fn invalid_config(reason: &'static str) -> Self {
        Self::InvalidConfig { reason }
    }

    /// Whether this error is fatal to the requesting computation
    ///
    /// `ArenaExhausted` is recoverable (the region stack grows past it);
    /// everything else indicates either exhausted address space or a caller
    /// bug.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ArenaExhausted { .. })
    }
}
