//! Utility types and constants used throughout the Swifi runtime.
//!
//! This module provides:
//! - Well-known file names and sizing constants ([`CONFIG_FILE`], [`HISTOGRAM_FILE`], etc.)
//! - Random number generation ([`Rng`])

mod constants;
mod rng;

pub use self::constants::*;
pub use self::rng::Rng;
