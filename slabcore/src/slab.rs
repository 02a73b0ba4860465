//! The slab instance: construction/teardown, the allocate/free fast
//! paths, and the adaptive physical-page expand/shrink state machine.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::bitmap::{bit_of_slot, slot_of, submap_of_slot, PageBitmap};
use crate::consts::{MAX_OBJ_SIZE, MIN_OBJ_SIZE, PAGE_SHIFT, PAGE_SIZE, SUBMAP_COUNT};
use crate::error::SlabInitError;
use crate::mmap;
use crate::page_lock::PageLockRef;
use crate::probe;

/// Construction parameters for a [`Slab`].
#[derive(Debug, Clone, Copy)]
pub struct SlabConfig {
    /// Size in bytes of each served object, `8 <= obj_size <= 4096`.
    pub obj_size: usize,
    /// Maximum number of pages the slab may ever reserve.
    pub max_page_count: usize,
}

/// A fixed-size-object slab allocator.
///
/// Serves `obj_size`-byte objects out of a backing region of up to
/// `max_page_count` pages. `allocate`/`free` are lock-free on their fast
/// path; the backing region's physical footprint expands and shrinks
/// adaptively with load (see the crate docs for the full protocol).
///
/// `Slab` is `Send + Sync`: every operation goes through atomics, and
/// concurrent use from multiple threads on one `&Slab` is the intended
/// usage.
pub struct Slab {
    obj_size: usize,
    slot_count_per_page: usize,
    virt_page_count: usize,
    phys_page_count: AtomicUsize,
    allocated_slot_count: AtomicUsize,
    phys_page_gate: AtomicBool,
    base_addr: NonNull<u8>,
    region_len: usize,
    bitmaps: Box<[PageBitmap]>,
    page_lock_refs: Box<[PageLockRef]>,
}

// SAFETY: all mutable state is reached exclusively through atomics; the
// raw `base_addr` pointer is never dereferenced without a slot computed
// from that same atomic bookkeeping.
unsafe impl Send for Slab {}
unsafe impl Sync for Slab {}

impl Slab {
    /// Constructs a new slab. Fails if `obj_size` is out of range or
    /// `max_page_count` is zero, or if the backing region can't be
    /// reserved from the OS.
    pub fn new(config: SlabConfig) -> Result<Self, SlabInitError> {
        let SlabConfig {
            obj_size,
            max_page_count,
        } = config;

        if !(MIN_OBJ_SIZE..=MAX_OBJ_SIZE).contains(&obj_size) {
            log::warn!("Slab::new: invalid obj_size {obj_size}");
            return Err(SlabInitError::InvalidObjSize(obj_size));
        }
        if max_page_count == 0 {
            log::warn!("Slab::new: max_page_count must be non-zero");
            return Err(SlabInitError::InvalidPageCount);
        }

        let slot_count_per_page = (PAGE_SIZE / obj_size).min(crate::consts::MAX_SLOTS_PER_PAGE);
        let region_len = max_page_count * PAGE_SIZE;

        let base_addr = mmap::reserve(region_len).map_err(|e| {
            log::error!("Slab::new: failed to reserve {region_len} bytes: {e}");
            SlabInitError::Mmap(e)
        })?;

        let bitmaps = (0..max_page_count)
            .map(|_| PageBitmap::new(slot_count_per_page))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let page_lock_refs = (0..max_page_count)
            .map(|_| PageLockRef::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            obj_size,
            slot_count_per_page,
            virt_page_count: max_page_count,
            phys_page_count: AtomicUsize::new(1),
            allocated_slot_count: AtomicUsize::new(0),
            phys_page_gate: AtomicBool::new(false),
            base_addr,
            region_len,
            bitmaps,
            page_lock_refs,
        })
    }

    /// Attempts to allocate one `obj_size`-byte object. Returns `None`
    /// when every physical page is full and the slab has already grown
    /// to `max_page_count`.
    pub fn allocate(&self) -> Option<NonNull<u8>> {
        loop {
            let phys = self.phys_page_count.load(Ordering::Acquire);
            let page_start = (probe::next_seed() % phys as u64) as usize;

            for i in 0..phys {
                let page_idx = (page_start + i) % phys;

                if !self.page_lock_refs[page_idx].try_ref() {
                    continue;
                }

                let submap_start = (probe::next_seed() % SUBMAP_COUNT as u64) as usize;
                let mut claimed = None;
                for j in 0..SUBMAP_COUNT {
                    let submap_idx = (submap_start + j) % SUBMAP_COUNT;
                    if let Some(bit) = self.bitmaps[page_idx].try_alloc(submap_idx) {
                        claimed = Some((submap_idx, bit));
                        break;
                    }
                }

                self.page_lock_refs[page_idx].unref();

                if let Some((submap_idx, bit)) = claimed {
                    let slot = slot_of(submap_idx, bit);
                    debug_assert!(slot < self.slot_count_per_page);

                    self.allocated_slot_count.fetch_add(1, Ordering::AcqRel);
                    self.maybe_expand();

                    let offset = page_idx * PAGE_SIZE + slot * self.obj_size;
                    // SAFETY: offset < virt_page_count * PAGE_SIZE, within the
                    // reserved region, and this slot's bit was just claimed by
                    // this thread's successful CAS, so no other caller holds it.
                    let ptr = unsafe { self.base_addr.as_ptr().add(offset) };
                    return Some(unsafe { NonNull::new_unchecked(ptr) });
                }
            }

            if phys < self.virt_page_count {
                self.maybe_expand();
                continue;
            }

            return None;
        }
    }

    /// Releases a slot previously returned by [`Slab::allocate`] on this
    /// same instance. A null pointer is a silent no-op; a pointer whose
    /// computed page index is out of range is logged and ignored.
    /// Any other input is a caller contract violation (undefined
    /// behavior, not detected).
    pub fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let base = self.base_addr.as_ptr() as usize;
        let addr = ptr as usize;
        let diff = addr.wrapping_sub(base);
        let page_idx = diff >> PAGE_SHIFT;

        if page_idx >= self.virt_page_count {
            log::warn!("Slab::free: pointer {ptr:p} has out-of-range page index {page_idx}");
            return;
        }

        let page_base = base + (page_idx << PAGE_SHIFT);
        let offset = addr - page_base;
        let slot = offset / self.obj_size;
        debug_assert!(slot < self.slot_count_per_page);

        self.bitmaps[page_idx].clear(submap_of_slot(slot), bit_of_slot(slot));
        self.allocated_slot_count.fetch_sub(1, Ordering::AcqRel);
        // Balances the `try_ref` increment taken by whichever `allocate`
        // call handed out this slot (spec §9, Open Question 4); freeing
        // never needs to block a concurrent shrink, since the submap
        // bit-clear is safe to race with a reclaim check.
        self.page_lock_refs[page_idx].unref();

        self.maybe_shrink();
    }

    /// Current physical-page watermark. Advisory: may be stale by the
    /// time the caller observes it.
    pub fn phys_page_count(&self) -> usize {
        self.phys_page_count.load(Ordering::Relaxed)
    }

    /// Current count of live (allocated, not yet freed) objects.
    /// Advisory: may be stale by the time the caller observes it.
    pub fn allocated_slot_count(&self) -> usize {
        self.allocated_slot_count.load(Ordering::Relaxed)
    }

    /// Maximum number of pages this instance may ever reserve.
    pub fn virt_page_count(&self) -> usize {
        self.virt_page_count
    }

    /// Number of real slots per page (`PAGE_SIZE / obj_size`, capped).
    pub fn slot_count_per_page(&self) -> usize {
        self.slot_count_per_page
    }

    /// Grows `phys_page_count` by one page if usage has crossed half of
    /// the current footprint's slot capacity and there is still virtual
    /// room to grow. Advisory: any thread that loses the gate CAS simply
    /// returns without retrying.
    fn maybe_expand(&self) {
        let phys = self.phys_page_count.load(Ordering::Acquire);
        let max_slots = phys * self.slot_count_per_page;
        if self.allocated_slot_count.load(Ordering::Acquire) < max_slots / 2 {
            return;
        }

        if self
            .phys_page_gate
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let phys = self.phys_page_count.load(Ordering::Acquire);
        if phys < self.virt_page_count {
            // The page being activated may still carry a lock bit left by
            // a prior shrink; clear it before publishing the new count so
            // no allocator can observe a locked page through
            // `phys_page_count` (spec §4.5 invariant).
            self.page_lock_refs[phys].unlock();
            self.phys_page_count.store(phys + 1, Ordering::Release);
            log::debug!("slab expanded to {} physical pages", phys + 1);
        }

        self.phys_page_gate.store(false, Ordering::SeqCst);
    }

    /// Shrinks `phys_page_count` by one page if usage has fallen to an
    /// eighth of the current footprint's slot capacity, the page is
    /// quiescent, and more than one page is active (the first page is
    /// never reclaimed).
    fn maybe_shrink(&self) {
        let phys = self.phys_page_count.load(Ordering::Acquire);
        let max_slots = phys * self.slot_count_per_page;
        if self.allocated_slot_count.load(Ordering::Acquire) > max_slots / 8 {
            return;
        }

        if self
            .phys_page_gate
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let phys = self.phys_page_count.load(Ordering::Acquire);
        let last = phys - 1;
        if last == 0 {
            self.phys_page_gate.store(false, Ordering::SeqCst);
            return;
        }

        let word = self.page_lock_refs[last].lock();
        if PageLockRef::is_reclaimable(word) {
            let page_addr = unsafe { self.base_addr.as_ptr().add(last * PAGE_SIZE) };
            // SAFETY: `page_addr` is non-null (offset from a non-null base
            // within the reserved region).
            mmap::advise_free_page(unsafe { NonNull::new_unchecked(page_addr) }, PAGE_SIZE);
            self.phys_page_count.store(last, Ordering::Release);
            log::debug!("slab shrunk to {last} physical pages");
        } else {
            // Resolution of spec §9 Open Question 1: never strand a
            // locked bit on a page that won't be revisited by a future
            // expand at this exact index for a while. Always undo the
            // lock we just took when the page turns out not to be
            // quiescent, rather than leaving it for `maybe_expand` to
            // clean up later.
            self.page_lock_refs[last].unlock();
        }

        self.phys_page_gate.store(false, Ordering::SeqCst);
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: `base_addr`/`region_len` were obtained together from a
        // single successful `mmap::reserve` call in `Slab::new`, and `Slab`
        // exclusively owns the region until this point.
        unsafe { mmap::release(self.base_addr, self.region_len) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(obj_size: usize, max_page_count: usize) -> SlabConfig {
        SlabConfig {
            obj_size,
            max_page_count,
        }
    }

    #[test]
    fn rejects_tiny_obj_size() {
        assert!(matches!(
            Slab::new(cfg(4, 1)),
            Err(SlabInitError::InvalidObjSize(4))
        ));
    }

    #[test]
    fn rejects_oversize_obj_size() {
        assert!(matches!(
            Slab::new(cfg(PAGE_SIZE + 1, 1)),
            Err(SlabInitError::InvalidObjSize(_))
        ));
    }

    #[test]
    fn rejects_zero_page_count() {
        assert!(matches!(
            Slab::new(cfg(4096, 0)),
            Err(SlabInitError::InvalidPageCount)
        ));
    }

    #[test]
    fn free_null_is_noop() {
        let slab = Slab::new(cfg(64, 1)).unwrap();
        slab.free(std::ptr::null_mut());
        assert_eq!(slab.allocated_slot_count(), 0);
    }

    #[test]
    fn free_out_of_range_page_is_noop() {
        let slab = Slab::new(cfg(64, 1)).unwrap();
        let bogus = (slab.phys_page_count() * PAGE_SIZE * 100) as *mut u8;
        slab.free(bogus);
        assert_eq!(slab.allocated_slot_count(), 0);
    }

    // Scenario A — single-threaded saturation.
    #[test]
    fn scenario_a_single_threaded_saturation() {
        let slab = Slab::new(cfg(64, 2)).unwrap();
        assert_eq!(slab.slot_count_per_page(), 64);

        let mut ptrs = Vec::new();
        while let Some(p) = slab.allocate() {
            ptrs.push(p);
        }
        assert_eq!(ptrs.len(), 128);
        assert!(slab.allocate().is_none());
        assert!(slab.phys_page_count() >= 1);

        for p in ptrs.into_iter().rev() {
            slab.free(p.as_ptr());
        }
        assert_eq!(slab.allocated_slot_count(), 0);
        assert!(slab.allocate().is_some());
    }

    // Scenario B — expand trigger.
    #[test]
    fn scenario_b_expand_trigger() {
        let slab = Slab::new(cfg(128, 4)).unwrap();
        assert_eq!(slab.slot_count_per_page(), 32);

        let mut ptrs = Vec::new();
        for _ in 0..17 {
            ptrs.push(slab.allocate().unwrap());
        }
        // The 17th allocation crosses half of one page's 32 slots; the
        // expand evaluator runs synchronously inside that same call.
        assert_eq!(slab.phys_page_count(), 2);

        for _ in ptrs.len()..33 {
            ptrs.push(slab.allocate().unwrap());
        }
        assert_eq!(ptrs.len(), 33);
        assert_eq!(slab.phys_page_count(), 3);
    }

    // Scenario C — shrink after drain.
    #[test]
    fn scenario_c_shrink_after_drain() {
        let slab = Slab::new(cfg(256, 8)).unwrap();
        assert_eq!(slab.slot_count_per_page(), 16);

        let mut ptrs = Vec::new();
        for _ in 0..120 {
            ptrs.push(slab.allocate().unwrap());
        }
        assert!(slab.phys_page_count() >= 8);

        for p in ptrs.drain(..119) {
            slab.free(p.as_ptr());
        }
        // Further allocate/free activity lets the shrink evaluator keep
        // running; one more alloc/free pair is enough to trigger it again.
        for _ in 0..4 {
            if let Some(p) = slab.allocate() {
                slab.free(p.as_ptr());
            }
        }
        assert!(slab.phys_page_count() <= 2);

        for p in ptrs {
            slab.free(p.as_ptr());
        }
    }

    #[test]
    fn single_threaded_alloc_free_restores_counters() {
        let slab = Slab::new(cfg(64, 1)).unwrap();
        let before = slab.bitmaps[0].load_submap(0);
        let p = slab.allocate().unwrap();
        slab.free(p.as_ptr());
        assert_eq!(slab.bitmaps[0].load_submap(0), before);
        assert_eq!(slab.allocated_slot_count(), 0);
    }

    #[test]
    fn pointers_are_distinct_and_aligned_to_stride() {
        let slab = Slab::new(cfg(48, 2)).unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut ptrs = Vec::new();
        for _ in 0..64 {
            let p = slab.allocate().unwrap();
            assert!(seen.insert(p.as_ptr() as usize));
            let base = slab.base_addr.as_ptr() as usize;
            assert_eq!((p.as_ptr() as usize - base) % slab.obj_size, 0);
            ptrs.push(p);
        }
        for p in ptrs {
            slab.free(p.as_ptr());
        }
    }
}
