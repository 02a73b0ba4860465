//! Benchmark driver binary: spawns worker threads against `slabcore` (or
//! the system allocator), samples throughput/memory/slab counters once a
//! second, and writes the series to CSV.
//!
//! This binary is deliberately kept outside `slabcore`'s own crate — the
//! allocator engine has no notion of threads-to-spawn, CLI flags, or
//! CSV files; those are this crate's concern alone.

mod backend;
mod cli;
mod metrics;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use backend::Backend;
use cli::Cli;
use worker::Counters;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    log::info!(
        "starting run: backend={:?} mode={:?} threads={} duration={}s",
        cli.backend,
        cli.mode,
        cli.threads,
        cli.duration_secs
    );

    let backend = Arc::new(Backend::new(cli.backend, cli.obj_size, cli.max_pages)?);
    let counters = Arc::new(Counters::default());
    let stop = Arc::new(AtomicBool::new(false));

    let end_time = Instant::now() + Duration::from_secs(cli.duration_secs);

    let metrics_handle = {
        let backend = Arc::clone(&backend);
        let counters = Arc::clone(&counters);
        let stop = Arc::clone(&stop);
        let out_dir = cli.out_dir.clone();
        std::thread::spawn(move || metrics::run(&out_dir, backend, counters, stop))
    };

    let worker_handles = worker::spawn_workers(
        Arc::clone(&backend),
        Arc::clone(&counters),
        cli.mode,
        cli.chunk_size,
        cli.threads,
        end_time,
    );

    for h in worker_handles {
        h.join().expect("worker thread panicked");
    }

    stop.store(true, Ordering::Relaxed);
    metrics_handle
        .join()
        .expect("metrics thread panicked")?;

    let final_alloc = counters.alloc_count.load(Ordering::Relaxed);
    let final_free = counters.free_count.load(Ordering::Relaxed);
    log::info!("run complete: {final_alloc} allocs, {final_free} frees");
    if let Some((pages, slots)) = backend.slab_stats() {
        log::info!("final slab state: phys_page_count={pages} allocated_slot_count={slots}");
    }

    Ok(())
}
