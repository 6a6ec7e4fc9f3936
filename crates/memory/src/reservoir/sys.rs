//! Platform layer for address-space reservation
//!
//! The reservoir's only collaborator contract: reserve a contiguous range,
//! release it later. Pages are backed lazily by the OS; commit/decommit is
//! the platform's concern and never surfaces above this module.
//!
//! # Safety
//!
//! Both functions perform unsafe FFI calls to OS primitives:
//! - **Unix**: `mmap` / `munmap` (anonymous private mapping, `MAP_NORESERVE`
//!   on Linux so large sparse reservations do not count against commit)
//! - **Windows**: `VirtualAlloc` / `VirtualFree`
//! - **Fallback**: `std::alloc` for unsupported platforms
//!
//! Callers must ensure a range is released exactly once, with the same
//! length it was reserved with, and never accessed afterwards.

use std::io;
use std::ptr::NonNull;

/// Alignment used by the `std::alloc` fallback path
#[cfg(not(any(unix, windows)))]
const FALLBACK_ALIGN: usize = 64;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        const MAP_FLAGS: libc::c_int =
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    } else if #[cfg(unix)] {
        const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    }
}

/// Reserve `len` bytes of contiguous, demand-backed address space
pub(crate) fn reserve(len: usize) -> io::Result<NonNull<u8>> {
    debug_assert!(len > 0);

    #[cfg(unix)]
    {
        use libc::{MAP_FAILED, PROT_READ, PROT_WRITE, mmap};

        // SAFETY: FFI call to mmap for an anonymous mapping.
        // - addr=null lets the OS choose placement
        // - len is non-zero (debug-asserted; the reservoir rounds every
        //   request to a class before calling in)
        // - fd=-1, offset=0: no file backing
        // The OS validates everything else and returns MAP_FAILED on error.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_FLAGS,
                -1,
                0,
            )
        };

        if ptr == MAP_FAILED {
            Err(io::Error::last_os_error())
        } else {
            // SAFETY: MAP_FAILED (-1) was ruled out, and mmap never returns
            // null for a successful anonymous mapping.
            Ok(unsafe { NonNull::new_unchecked(ptr.cast::<u8>()) })
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};

        // SAFETY: FFI call to VirtualAlloc.
        // - addr=null lets the OS choose placement
        // - MEM_COMMIT | MEM_RESERVE yields demand-zero pages; physical
        //   backing still materializes lazily on first touch
        // Returns null on error.
        let ptr = unsafe {
            VirtualAlloc(
                std::ptr::null_mut(),
                len,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };

        NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let layout = std::alloc::Layout::from_size_align(len, FALLBACK_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: Fallback through the global allocator; layout is valid
        // (checked above).
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "allocation failed"))
    }
}

/// Release a range previously obtained from [`reserve`]
///
/// # Safety contract (checked by callers, not the type system)
///
/// - `base` must have been returned by `reserve`
/// - `len` must match the reserved length
/// - the range must not be accessed after this call
pub(crate) fn release(base: NonNull<u8>, len: usize) -> io::Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: FFI call to munmap; caller guarantees base/len came from
        // reserve() and the range is dead.
        let result = unsafe { libc::munmap(base.as_ptr().cast::<libc::c_void>(), len) };
        if result == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualFree;
        use winapi::um::winnt::MEM_RELEASE;

        let _ = len; // MEM_RELEASE frees the whole reservation

        // SAFETY: FFI call to VirtualFree; caller guarantees base came from
        // VirtualAlloc. MEM_RELEASE with size=0 releases the entire region.
        let result =
            unsafe { VirtualFree(base.as_ptr().cast::<winapi::ctypes::c_void>(), 0, MEM_RELEASE) };
        if result == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let layout = std::alloc::Layout::from_size_align(len, FALLBACK_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: Fallback dealloc; caller guarantees base/len match the
        // original reservation.
        unsafe { std::alloc::dealloc(base.as_ptr(), layout) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_release_roundtrip() {
        let len = 64 * 1024;
        let base = reserve(len).expect("reservation failed");

        // Demand-backed pages must be readable and writable once touched.
        // SAFETY: base points at a fresh len-byte reservation owned here.
        unsafe {
            base.as_ptr().write(0xA5);
            base.as_ptr().add(len - 1).write(0x5A);
            assert_eq!(base.as_ptr().read(), 0xA5);
        }

        release(base, len).expect("release failed");
    }

    #[test]
    fn large_sparse_reservation() {
        // 256 MiB of address space; only one page is ever touched, so this
        // must not require that much physical memory.
        let len = 256 * 1024 * 1024;
        let base = reserve(len).expect("sparse reservation failed");
        // SAFETY: first byte of an owned reservation.
        unsafe { base.as_ptr().write(1) };
        release(base, len).expect("release failed");
    }
}
