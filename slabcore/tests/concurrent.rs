//! Multithreaded integration tests (spec scenarios D and E).
//!
//! Iteration counts are scaled down from the million-iteration seed
//! scenario so the suite finishes in a reasonable time; the properties
//! under test (no double handout, counters settle to zero, the
//! footprint both grows and shrinks) do not depend on the exact count.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use slabcore::{Slab, SlabConfig};

/// Scenario D — concurrent churn: many threads repeatedly allocate and
/// free a single object each, writing their thread id into the slot to
/// catch a slot handed to two threads at once.
#[test]
fn scenario_d_concurrent_churn_no_double_handout() {
    let slab = Arc::new(
        Slab::new(SlabConfig {
            obj_size: 64,
            max_page_count: 16,
        })
        .unwrap(),
    );

    let thread_count = 8usize;
    let iters_per_thread = 20_000usize;

    let handles: Vec<_> = (0..thread_count)
        .map(|tid| {
            let slab = Arc::clone(&slab);
            thread::spawn(move || {
                let marker = (tid as u64) + 1;
                for _ in 0..iters_per_thread {
                    let ptr = slab
                        .allocate()
                        .expect("capacity is ample for this churn pattern");

                    // SAFETY: obj_size is 64 bytes, plenty for one u64,
                    // and this slot was just exclusively claimed.
                    unsafe { (ptr.as_ptr() as *mut u64).write(marker) };
                    thread::yield_now();
                    // SAFETY: same slot, no other thread can hold it
                    // between this allocate and the free below.
                    let seen = unsafe { (ptr.as_ptr() as *const u64).read() };
                    assert_eq!(seen, marker, "slot was handed to two threads at once");

                    slab.free(ptr.as_ptr());
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(slab.allocated_slot_count(), 0);
    assert!(slab.phys_page_count() >= 1);
}

/// Scenario E — chunked burst: threads allocate a batch, then free the
/// whole batch, repeatedly; the footprint should be observed both above
/// its floor and back down from its peak.
#[test]
fn scenario_e_chunked_burst_grows_and_shrinks() {
    let slab = Arc::new(
        Slab::new(SlabConfig {
            obj_size: 128,
            max_page_count: 16,
        })
        .unwrap(),
    );

    let thread_count = 4usize;
    let rounds = 50usize;
    let chunk_size = 1000usize;

    let peak_pages = Arc::new(AtomicUsize::new(1));

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let slab = Arc::clone(&slab);
            let peak_pages = Arc::clone(&peak_pages);
            thread::spawn(move || {
                for _ in 0..rounds {
                    let mut ptrs = Vec::with_capacity(chunk_size);
                    for _ in 0..chunk_size {
                        if let Some(p) = slab.allocate() {
                            ptrs.push(p);
                        }
                    }
                    peak_pages.fetch_max(slab.phys_page_count(), Ordering::Relaxed);
                    for p in ptrs {
                        slab.free(p.as_ptr());
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(slab.allocated_slot_count(), 0);
    let peak = peak_pages.load(Ordering::Relaxed);
    assert!(peak > 1, "phys_page_count never grew past its floor");
    assert!(
        slab.phys_page_count() < peak,
        "phys_page_count never shrank back down from its peak of {peak}"
    );
}

/// Invalid-input scenario F, exercised as an integration test since it
/// spans construction and free in one story.
#[test]
fn scenario_f_invalid_inputs() {
    assert!(Slab::new(SlabConfig {
        obj_size: 4,
        max_page_count: 1,
    })
    .is_err());

    assert!(Slab::new(SlabConfig {
        obj_size: 4096,
        max_page_count: 0,
    })
    .is_err());

    let slab = Slab::new(SlabConfig {
        obj_size: 4096,
        max_page_count: 2,
    })
    .unwrap();
    slab.free(std::ptr::null_mut());
    assert_eq!(slab.allocated_slot_count(), 0);

    let base = slab.allocate().unwrap().as_ptr() as usize;
    // A huge offset guaranteed to fall outside any 2-page region.
    let out_of_range = (base + slab.virt_page_count() * slabcore::PAGE_SIZE * 10) as *mut u8;
    slab.free(out_of_range);
    assert_eq!(slab.allocated_slot_count(), 1);
}
