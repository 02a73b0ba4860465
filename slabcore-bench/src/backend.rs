//! Allocator backends the benchmark can drive: `slabcore::Slab` itself,
//! or `std::alloc::System` as a baseline (ported from `benchmark.cpp`'s
//! `AllocMode::MALLOC`).

use std::alloc::{self, Layout};

use slabcore::{Slab, SlabConfig};

use crate::cli::Backend as BackendKind;

/// One allocator a worker thread can call into.
pub enum Backend {
    /// Drives `slabcore::Slab`.
    Slab(Slab),
    /// Drives `std::alloc::System` with a fixed layout, as a baseline.
    System {
        /// Layout used for every `alloc`/`dealloc` call.
        layout: Layout,
    },
}

impl Backend {
    pub fn new(kind: BackendKind, obj_size: usize, max_pages: usize) -> anyhow::Result<Self> {
        match kind {
            BackendKind::Slab => {
                let slab = Slab::new(SlabConfig {
                    obj_size,
                    max_page_count: max_pages,
                })
                .map_err(|e| anyhow::anyhow!("failed to construct slab: {e}"))?;
                Ok(Backend::Slab(slab))
            }
            BackendKind::System => {
                let layout = Layout::from_size_align(obj_size, align_for(obj_size))?;
                Ok(Backend::System { layout })
            }
        }
    }

    #[inline]
    pub fn alloc(&self) -> Option<*mut u8> {
        match self {
            Backend::Slab(slab) => slab.allocate().map(|p| p.as_ptr()),
            Backend::System { layout } => {
                // SAFETY: `layout` has non-zero size (checked at construction).
                let ptr = unsafe { alloc::alloc(*layout) };
                if ptr.is_null() {
                    None
                } else {
                    Some(ptr)
                }
            }
        }
    }

    #[inline]
    pub fn free(&self, ptr: *mut u8) {
        match self {
            Backend::Slab(slab) => slab.free(ptr),
            Backend::System { layout } => {
                if !ptr.is_null() {
                    // SAFETY: `ptr` was returned by `alloc::alloc` with this
                    // same layout and has not already been freed.
                    unsafe { alloc::dealloc(ptr, *layout) };
                }
            }
        }
    }

    /// `Some((phys_page_count, allocated_slot_count))` for the slab
    /// backend; `None` for the system backend (no such counters exist).
    pub fn slab_stats(&self) -> Option<(usize, usize)> {
        match self {
            Backend::Slab(slab) => Some((slab.phys_page_count(), slab.allocated_slot_count())),
            Backend::System { .. } => None,
        }
    }
}

fn align_for(obj_size: usize) -> usize {
    obj_size.next_power_of_two().min(16).max(1)
}
