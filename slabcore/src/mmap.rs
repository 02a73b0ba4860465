//! Thin wrapper around the raw `mmap`/`munmap`/`madvise` FFI surface.
//!
//! Isolating the unsafe OS calls here keeps the allocator logic in
//! `slab.rs` free of raw pointer arithmetic against syscalls.

use std::io;
use std::ptr::NonNull;

/// Reserves `len` bytes of anonymous, page-aligned, zero-filled memory.
///
/// Physical pages are realized lazily by the OS on first touch.
pub(crate) fn reserve(len: usize) -> io::Result<NonNull<u8>> {
    // SAFETY: `len` is non-zero (checked by the caller) and all arguments are
    // valid for an anonymous private mapping.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: mmap succeeded, so `ptr` is non-null.
    Ok(unsafe { NonNull::new_unchecked(ptr.cast()) })
}

/// Releases a region previously obtained from [`reserve`].
///
/// # Safety
///
/// `base` and `len` must exactly match a prior successful [`reserve`] call,
/// and no outstanding pointer into the region may still be in use.
pub(crate) unsafe fn release(base: NonNull<u8>, len: usize) {
    // SAFETY: forwarded from the caller's contract.
    let rc = unsafe { libc::munmap(base.as_ptr().cast(), len) };
    debug_assert_eq!(rc, 0, "munmap failed: {}", io::Error::last_os_error());
}

/// Hints to the OS that the single page at `base` may be reclaimed.
///
/// This is advisory: a write to the page before the OS acts on the hint
/// silently cancels it (spec §9, Open Question 2). No unmap/remap is
/// performed.
pub(crate) fn advise_free_page(base: NonNull<u8>, len: usize) {
    // SAFETY: `base` points `len` bytes into a region still owned by the
    // caller's `Slab`; advising is a no-op to memory contents.
    let rc = unsafe { libc::madvise(base.as_ptr().cast(), len, madv_free()) };
    if rc != 0 {
        log::warn!(
            "madvise(MADV_FREE) failed: {}",
            io::Error::last_os_error()
        );
    }
}

#[cfg(target_os = "linux")]
fn madv_free() -> libc::c_int {
    libc::MADV_FREE
}

#[cfg(not(target_os = "linux"))]
fn madv_free() -> libc::c_int {
    // MADV_FREE is Linux/BSD-specific; DONTNEED is the closest portable
    // advisory release (content becomes undefined, pages may be reclaimed).
    libc::MADV_DONTNEED
}
