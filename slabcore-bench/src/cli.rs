//! Command-line surface for the benchmark driver.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Drives worker threads against `slabcore` (or the system allocator) and
/// logs throughput, memory, and slab-internal counters to CSV.
#[derive(Parser, Debug)]
#[command(name = "slabcore-bench")]
#[command(about = "Throughput/memory benchmark driver for the slabcore allocator")]
pub struct Cli {
    /// Number of worker threads.
    #[arg(short = 'j', long, default_value_t = 4)]
    pub threads: usize,

    /// How long each worker runs, in seconds.
    #[arg(short, long = "duration-secs", default_value_t = 10)]
    pub duration_secs: u64,

    /// Worker access pattern.
    #[arg(long, value_enum, default_value_t = Mode::Steady)]
    pub mode: Mode,

    /// Allocator backend to drive.
    #[arg(long, value_enum, default_value_t = Backend::Slab)]
    pub backend: Backend,

    /// Object size in bytes (slab backend only).
    #[arg(long, default_value_t = 128)]
    pub obj_size: usize,

    /// Maximum physical page count (slab backend only).
    #[arg(long, default_value_t = 256)]
    pub max_pages: usize,

    /// Batch size for the `chunked` and `phased` modes.
    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,

    /// Directory to write `throughput.csv`, `memory.csv`, and
    /// `slab_stats.csv` into.
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,
}

/// Worker access pattern, ported from the reference benchmark's B=1/2/3
/// modes.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Allocate and immediately free one object at a time.
    Steady,
    /// Allocate a batch of `chunk_size` objects, then free the batch.
    Chunked,
    /// Replay a built-in ramp-up/steady/ramp-down load schedule.
    Phased,
}

/// Which allocator the workers call into.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// `slabcore::Slab`.
    Slab,
    /// `std::alloc::System`, as a baseline.
    System,
}
