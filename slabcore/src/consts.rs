//! Fixed constants from the allocator design (spec §6).

/// Size in bytes of one virtual/physical page.
pub const PAGE_SIZE: usize = 4096;

/// `log2(PAGE_SIZE)`, used for the page-index shift in address arithmetic.
pub const PAGE_SHIFT: u32 = 12;

/// Number of atomic 32-bit submaps per page bitmap descriptor.
pub const SUBMAP_COUNT: usize = 16;

/// Upper bound on slots per page (`SUBMAP_COUNT * 32`).
pub const MAX_SLOTS_PER_PAGE: usize = SUBMAP_COUNT * 32;

/// Smallest object size the allocator will serve.
pub const MIN_OBJ_SIZE: usize = 8;

/// Largest object size the allocator will serve (one page).
pub const MAX_OBJ_SIZE: usize = PAGE_SIZE;
