use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{ClockKind, CoarseSource};
use crate::logging::LogArgs;

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Per-population statistics and the best hit/miss threshold
    Summary,
    /// One "population value" pair per line
    Lines,
    /// population,index,value with a header row
    Csv,
    /// JSON object with the clock kind and both sample arrays
    Json,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Target cache size in bytes
    #[arg(long)]
    pub cache_size: Option<usize>,

    /// Eviction set size in bytes (must exceed the cache size)
    #[arg(long)]
    pub eviction_set_size: Option<usize>,

    /// Warm-up rounds before each hit measurement (1-16)
    #[arg(long)]
    pub prime_rounds: Option<u32>,

    /// Victim accesses per warm-up round (1-1000000)
    #[arg(long)]
    pub warm_repetitions: Option<u32>,

    /// Seed for victim placement and eviction set contents
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ClockArgs {
    /// Coarse clock refined by the interpolation clock
    #[arg(long = "coarse-clock", value_enum)]
    pub coarse_clock: Option<CoarseSource>,

    /// Tick length of the quantized coarse clock in nanoseconds
    #[arg(long)]
    pub resolution_ns: Option<u64>,

    /// Size of the shared counter region in bytes (8-4096)
    #[arg(long)]
    pub counter_region_bytes: Option<usize>,

    /// Allow the shared counter clock
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub shared_counter: Option<bool>,
}

#[derive(Debug, Parser)]
#[command(
    name = "cachetimer",
    about = "Distinguish cache hits from misses with software-built timers"
)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Clock used to time each access
    #[arg(long, value_enum, default_value_t = ClockKind::Interpolation)]
    pub clock: ClockKind,

    /// Measurements per population (default: 1000)
    #[arg(short = 'n', long = "repetitions")]
    pub repetitions: Option<usize>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Summary)]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long = "output-file")]
    pub output_file: Option<PathBuf>,

    /// Configuration file path (default: /etc/cachetimer.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    /// Add error rates for averaging up to N measurements per decision (default N: 50)
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "50")]
    pub error_reps: Option<usize>,

    /// Also report the error rates of this threshold
    #[arg(long, value_name = "T")]
    pub threshold: Option<u64>,

    #[command(flatten)]
    pub session: SessionArgs,

    #[command(flatten)]
    pub clock_opts: ClockArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Measure how many increments the interpolation clock fits in one coarse tick
    Distribution(DistributionArgs),
    /// Measure the cost and resolution of each timing primitive
    Timers(TimersArgs),
}

#[derive(Debug, Parser)]
pub struct DistributionArgs {
    /// Number of coarse periods to measure
    #[arg(short = 'n', long, default_value_t = 100)]
    pub count: usize,

    /// Print one count per line instead of a summary
    #[arg(long)]
    pub raw: bool,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long = "output-file")]
    pub output_file: Option<PathBuf>,

    /// Configuration file path (default: /etc/cachetimer.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub clock_opts: ClockArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Debug, Parser)]
pub struct TimersArgs {
    /// Samples per timing primitive
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub samples: usize,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long = "output-file")]
    pub output_file: Option<PathBuf>,

    /// Configuration file path (default: /etc/cachetimer.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub clock_opts: ClockArgs,

    #[command(flatten)]
    pub log: LogArgs,
}
