//! Per-second sampling thread: throughput deltas, RSS, and slab
//! counters, written to CSV. Ported from `benchmark.cpp`'s
//! `metricsThreadFunc`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::backend::Backend;
use crate::worker::Counters;

#[derive(Serialize)]
struct ThroughputRow {
    time_sec: f64,
    alloc_tps: f64,
    free_tps: f64,
}

#[derive(Serialize)]
struct MemoryRow {
    time_sec: f64,
    rss_kb: i64,
}

#[derive(Serialize)]
struct SlabStatsRow {
    time_sec: f64,
    phys_page_count: usize,
    allocated_slot_count: usize,
}

/// Reads `VmRSS` (in KiB) from `/proc/self/status`, or `-1` if it can't
/// be determined (e.g. non-Linux).
pub fn current_rss_kb() -> i64 {
    read_rss_kb(Path::new("/proc/self/status")).unwrap_or(-1)
}

fn read_rss_kb(path: &Path) -> Option<i64> {
    let file = File::open(path).ok()?;
    for line in BufReader::new(file).lines() {
        let line = line.ok()?;
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest.trim().split_whitespace().next()?.parse().ok();
        }
    }
    None
}

/// Samples throughput, RSS, and (for the slab backend) allocator
/// counters once per second until `stop` is set, writing each series to
/// its own CSV file under `out_dir`.
pub fn run(
    out_dir: &Path,
    backend: Arc<Backend>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let mut throughput_w = csv::Writer::from_path(out_dir.join("throughput.csv"))
        .context("opening throughput.csv")?;
    let mut memory_w =
        csv::Writer::from_path(out_dir.join("memory.csv")).context("opening memory.csv")?;
    let mut slab_w = backend
        .slab_stats()
        .is_some()
        .then(|| csv::Writer::from_path(out_dir.join("slab_stats.csv")))
        .transpose()
        .context("opening slab_stats.csv")?;

    let start = Instant::now();
    let mut prev_tick = start;
    let mut prev_alloc = 0u64;
    let mut prev_free = 0u64;

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_secs(1));

        let now = Instant::now();
        let elapsed_since_tick = now.duration_since(prev_tick).as_secs_f64();
        let since_start = now.duration_since(start).as_secs_f64();
        prev_tick = now;

        let alloc = counters.alloc_count.load(Ordering::Relaxed);
        let free = counters.free_count.load(Ordering::Relaxed);
        let alloc_tps = if elapsed_since_tick > 0.0 {
            (alloc - prev_alloc) as f64 / elapsed_since_tick
        } else {
            0.0
        };
        let free_tps = if elapsed_since_tick > 0.0 {
            (free - prev_free) as f64 / elapsed_since_tick
        } else {
            0.0
        };
        prev_alloc = alloc;
        prev_free = free;

        throughput_w.serialize(ThroughputRow {
            time_sec: since_start,
            alloc_tps,
            free_tps,
        })?;
        memory_w.serialize(MemoryRow {
            time_sec: since_start,
            rss_kb: current_rss_kb(),
        })?;

        if let (Some(w), Some((pages, slots))) = (slab_w.as_mut(), backend.slab_stats()) {
            w.serialize(SlabStatsRow {
                time_sec: since_start,
                phys_page_count: pages,
                allocated_slot_count: slots,
            })?;
            w.flush()?;
        }

        throughput_w.flush()?;
        memory_w.flush()?;

        log::debug!(
            "t={since_start:.1}s alloc_tps={alloc_tps:.0} free_tps={free_tps:.0} rss_kb={}",
            current_rss_kb()
        );
    }

    Ok(())
}
