/// Campaign configuration file, read from the working directory
pub const CONFIG_FILE: &str = "fault_injection.conf";
/// Fault site hit histogram output file
pub const HISTOGRAM_FILE: &str = "fault_site_histogram.txt";
/// JSON campaign report output file
pub const STATS_FILE: &str = "fault_injection_stats.json";

/// Number of histogram slots allocated up front
pub const HISTOGRAM_INITIAL_CAPACITY: usize = 1000;
/// Histogram slots the dense buffer may grow to; higher indices are kept sparse
pub const HISTOGRAM_DENSE_LIMIT: usize = 1 << 20;

/// Seed used when neither an explicit seed nor clock seeding is configured
pub const DEFAULT_SEED: u64 = 1;

/// Bits per byte, used when a byte position hint narrows the flip target
pub const BYTE_BITS: u32 = 8;
