//! A lock-free, fixed-size-object slab allocator.
//!
//! One [`Slab`] instance serves objects of a single uniform size out of a
//! backing region of up to `max_page_count` pages, reserved lazily from
//! the OS. Allocation and free are lock-free on their fast path; the
//! instance's physical footprint grows when usage crosses a high-water
//! mark and shrinks (via an OS madvise hint) when usage drops, following
//! the adaptive expand/shrink protocol described on [`Slab`].
//!
//! Out of scope: variable-size allocations, alignment wider than one
//! page, NUMA placement, per-thread caches, multiple size classes per
//! instance, durability across process restart, and use from signal
//! handlers.

mod bitmap;
mod consts;
mod error;
mod mmap;
mod page_lock;
mod probe;
mod slab;

pub use consts::{MAX_OBJ_SIZE, MAX_SLOTS_PER_PAGE, MIN_OBJ_SIZE, PAGE_SIZE, SUBMAP_COUNT};
pub use error::SlabInitError;
pub use slab::{Slab, SlabConfig};
