//! # Swifi
//!
//! Software implemented fault injection for programs instrumented at compile time.
//!
//! This crate re-exports [`swifi_core`], the campaign logic, and with the `rt`
//! feature also `swifi_rt`, the C ABI runtime linked into instrumented targets.

pub use swifi_core::*;

#[cfg(feature = "rt")]
pub use swifi_rt;
