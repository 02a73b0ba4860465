//! Cheap per-thread, per-call probe seeding.
//!
//! The reference implementation seeds its hash from a captured stack
//! address; that has no portable, safe Rust equivalent and isn't needed
//! for the actual requirement, which is just per-thread, per-call
//! variance so concurrent allocators don't all start probing at the same
//! page (spec §9, "Patterns requiring re-architecture"). Each thread gets
//! a distinct salt on first use plus a counter that advances on every
//! probe; both are mixed through a SplitMix64-style integer hash.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SALT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static STATE: Cell<(u64, u64)> = Cell::new((
        splitmix64(NEXT_SALT.fetch_add(1, Ordering::Relaxed)),
        0,
    ));
}

#[inline]
const fn splitmix64(x: u64) -> u64 {
    let x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Returns the next pseudo-random `u64` for this thread, advancing its
/// per-thread probe counter.
pub(crate) fn next_seed() -> u64 {
    STATE.with(|state| {
        let (salt, counter) = state.get();
        state.set((salt, counter.wrapping_add(1)));
        splitmix64(salt ^ counter)
    })
}
