//! # Swifi Core
//!
//! `swifi-core` implements the decision logic of the Swifi software fault injection
//! runtime. Instrumented programs report every fault site they execute; the runtime
//! decides at which of them a single bit of the produced value is flipped, so that
//! faults arrive at a configurable average rate.
//!
//! ## Main Components
//!
//! - [`FaultInjectionContext`] - Process-wide campaign state combining all parts below.
//!   Instrumented programs talk to it through the exported C ABI of `swifi-rt`.
//!
//! - [`scheduler::Scheduler`] - Countdown deciding when the next fault fires. Countdowns
//!   are drawn uniformly from `[0, ceil(tf / ef))`.
//!
//! - [`gate::BlockGate`] - Per basic block fast path. Blocks the next fault cannot fall
//!   into are accounted in bulk and skip their per-site checks.
//!
//! - [`corrupt`] module - Fault categories and the single-bit flip over the raw bit
//!   pattern of integers, floats and addresses.
//!
//! - [`stats::Statistics`] and [`histogram::FaultSiteHistogram`] - Campaign counters
//!   and the optional per-site hit histogram.
//!
//! - [`config`] module - Campaign configuration and the `fault_injection.conf` parser.
//!
//! ## Example
//!
//! ```
//! use swifi_core::config::CampaignConfig;
//! use swifi_core::corrupt::{FaultKind, FaultSite};
//! use swifi_core::FaultInjectionContext;
//!
//! let config = CampaignConfig {
//!     initial_countdown: Some(1),
//!     bit_position: Some(5),
//!     ..CampaignConfig::new(1, 1)
//! };
//! let mut ctx = FaultInjectionContext::new(config);
//! if ctx.enter_block(Some("entry"), 1).is_live() {
//!     assert_eq!(ctx.corrupt(FaultKind::Int32, FaultSite::new(0), 0i32), 32);
//! }
//! assert_eq!(ctx.statistics().fault_injection_count(), 1);
//! ```

#![warn(missing_docs)]

pub mod config;
mod context;
pub mod corrupt;
pub mod gate;
pub mod histogram;
pub mod report;
pub mod scheduler;
pub mod stats;
pub mod util;

pub use context::{Error, FaultInjectionContext};
