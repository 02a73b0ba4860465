//! Worker thread bodies, ported from `benchmark.cpp`'s `workerB1`/`B2`/`B3`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::Backend;
use crate::cli::Mode;

/// Shared throughput counters, sampled once per second by the metrics
/// thread.
#[derive(Default)]
pub struct Counters {
    /// Total successful allocations across all workers.
    pub alloc_count: AtomicU64,
    /// Total frees across all workers.
    pub free_count: AtomicU64,
}

/// One fixed segment of the `phased` load schedule: during
/// `[start_sec, end_sec)` of each cycle, allocate in batches of
/// `chunk_size` at roughly `alloc_rate` objects/sec.
struct LoadPhase {
    start_sec: u64,
    end_sec: u64,
    alloc_rate: usize,
    chunk_size: usize,
}

/// A small built-in ramp-up / steady / ramp-down schedule, replayed in a
/// loop for the duration of the run.
fn default_load_phases() -> Vec<LoadPhase> {
    vec![
        LoadPhase {
            start_sec: 0,
            end_sec: 2,
            alloc_rate: 2_000,
            chunk_size: 200,
        },
        LoadPhase {
            start_sec: 2,
            end_sec: 8,
            alloc_rate: 20_000,
            chunk_size: 1_000,
        },
        LoadPhase {
            start_sec: 8,
            end_sec: 10,
            alloc_rate: 2_000,
            chunk_size: 200,
        },
    ]
}

/// Runs one worker until `end_time`, in the access pattern selected by
/// `mode`.
pub fn run(
    backend: &Backend,
    counters: &Counters,
    mode: Mode,
    chunk_size: usize,
    end_time: Instant,
) {
    match mode {
        Mode::Steady => run_steady(backend, counters, end_time),
        Mode::Chunked => run_chunked(backend, counters, chunk_size, end_time),
        Mode::Phased => run_phased(backend, counters, end_time),
    }
}

/// B=1: allocate and immediately free, one object at a time.
fn run_steady(backend: &Backend, counters: &Counters, end_time: Instant) {
    while Instant::now() < end_time {
        if let Some(ptr) = backend.alloc() {
            counters.alloc_count.fetch_add(1, Ordering::Relaxed);
            backend.free(ptr);
            counters.free_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// B=2: allocate a batch into a local `Vec`, then free the whole batch.
fn run_chunked(backend: &Backend, counters: &Counters, chunk_size: usize, end_time: Instant) {
    let mut local = Vec::with_capacity(chunk_size);
    while Instant::now() < end_time {
        local.clear();
        for _ in 0..chunk_size {
            if let Some(ptr) = backend.alloc() {
                local.push(ptr);
                counters.alloc_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        for ptr in local.drain(..) {
            backend.free(ptr);
            counters.free_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// B=3: replay `default_load_phases` in a loop, varying batch size and
/// rate by elapsed time within the cycle.
fn run_phased(backend: &Backend, counters: &Counters, end_time: Instant) {
    let phases = default_load_phases();
    let cycle_len = phases.last().map(|p| p.end_sec).unwrap_or(1).max(1);
    let start = Instant::now();
    let mut local = Vec::new();

    while Instant::now() < end_time {
        let elapsed = Instant::now().duration_since(start).as_secs();
        let mod_sec = elapsed % cycle_len;

        let (alloc_rate, chunk_size) = phases
            .iter()
            .find(|p| mod_sec >= p.start_sec && mod_sec < p.end_sec)
            .map(|p| (p.alloc_rate, p.chunk_size))
            .unwrap_or((1_000, 200));

        let repeats = (alloc_rate / chunk_size.max(1)).max(1);
        let tick_end = Instant::now() + Duration::from_secs(1);

        for _ in 0..repeats {
            if Instant::now() >= end_time {
                break;
            }
            local.clear();
            local.reserve(chunk_size);
            for _ in 0..chunk_size {
                if let Some(ptr) = backend.alloc() {
                    local.push(ptr);
                    counters.alloc_count.fetch_add(1, Ordering::Relaxed);
                }
            }
            for ptr in local.drain(..) {
                backend.free(ptr);
                counters.free_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        if Instant::now() < tick_end {
            std::thread::sleep(tick_end - Instant::now());
        }
    }
}

/// Spawns `thread_count` workers sharing one `backend`, each running
/// until `end_time`.
pub fn spawn_workers(
    backend: Arc<Backend>,
    counters: Arc<Counters>,
    mode: Mode,
    chunk_size: usize,
    thread_count: usize,
    end_time: Instant,
) -> Vec<std::thread::JoinHandle<()>> {
    (0..thread_count)
        .map(|_| {
            let backend = Arc::clone(&backend);
            let counters = Arc::clone(&counters);
            std::thread::spawn(move || run(&backend, &counters, mode, chunk_size, end_time))
        })
        .collect()
}
