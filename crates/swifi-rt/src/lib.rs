//! # Swifi Runtime
//!
//! `swifi-rt` is the library linked into programs instrumented for software fault
//! injection. It exports the unmangled C ABI the instrumentation pass emits calls
//! to and keeps one process-wide [`FaultInjectionContext`].
//!
//! ## Call Protocol
//!
//! 1. `initializeFaultInjectionCampaign(ef, tf)` once at program start. Reads
//!    `fault_injection.conf` from the working directory and registers the
//!    shutdown report with `atexit`.
//! 2. `enterFaultSiteBlock(name, n)` (or `incrementFaultSiteCount(n)`) at the entry
//!    of every basic block holding `n` fault sites.
//! 3. If `isNextFaultInThisBB()` holds, one `corrupt*` call per fault site. Each
//!    returns the value unchanged or with exactly one bit flipped.
//!
//! Every entry point returns normally. Failures are logged, never raised into the
//! host program.
//!
//! ## Logging
//!
//! Diagnostics go through `log` to an `env_logger` installed on initialization,
//! filtered by `RUST_LOG` (default `info`).
#![allow(non_snake_case)]

use lazy_static::lazy_static;
use log::{debug, info, warn};
use std::ffi::{CStr, c_char, c_double, c_float, c_int, c_longlong, c_short};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use swifi_core::corrupt::{BitPattern, FaultKind, FaultSite, Pointee};
use swifi_core::util::{CONFIG_FILE, HISTOGRAM_FILE};
use swifi_core::{Error, FaultInjectionContext};

lazy_static! {
    static ref CONTEXT: Mutex<FaultInjectionContext> =
        Mutex::new(FaultInjectionContext::default());
}

static SHUTDOWN_HOOK: Once = Once::new();

/// Locks the process-wide context.
///
/// A panic while the lock was held leaves the context usable, so poisoning is
/// ignored.
fn context() -> MutexGuard<'static, FaultInjectionContext> {
    CONTEXT.lock().unwrap_or_else(PoisonError::into_inner)
}

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

fn non_negative(name: &str, value: c_int) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| {
        warn!("Negative {} {}, using 0", name, value);
        0
    })
}

extern "C" fn shutdown_hook() {
    finalize();
}

fn finalize() {
    match context().finalize(".") {
        Ok(_) | Err(Error::AlreadyFinalized) => {}
        Err(e) => warn!("Failed to write fault injection results: {}", e),
    }
}

/// Starts the campaign with `ef` faults per `tf` fault sites.
#[unsafe(no_mangle)]
pub extern "C" fn initializeFaultInjectionCampaign(ef: c_int, tf: c_int) {
    init_logging();
    let ctx = FaultInjectionContext::initialize(
        non_negative("error frequency", ef),
        non_negative("total trials", tf),
        CONFIG_FILE,
    );
    *context() = ctx;
    SHUTDOWN_HOOK.call_once(|| {
        // SAFETY: `shutdown_hook` is a plain extern "C" fn without arguments.
        if unsafe { libc::atexit(shutdown_hook) } != 0 {
            warn!("Failed to register shutdown hook, call finalizeFaultInjectionCampaign");
        }
    });
}

/// Enters a basic block holding `bb_fs_count` fault sites.
#[unsafe(no_mangle)]
pub extern "C" fn incrementFaultSiteCount(bb_fs_count: c_int) {
    let sites = non_negative("fault site count", bb_fs_count);
    context().enter_block(None, sites);
}

/// Enters the basic block `name` holding `bb_fs_count` fault sites.
///
/// # Safety
///
/// `name` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn enterFaultSiteBlock(name: *const c_char, bb_fs_count: c_int) {
    let sites = non_negative("fault site count", bb_fs_count);
    // SAFETY: caller guarantees a NUL-terminated string if non-null.
    let name = (!name.is_null()).then(|| unsafe { CStr::from_ptr(name) }.to_string_lossy());
    context().enter_block(name.as_deref(), sites);
}

/// Whether the current basic block needs its per-site corruption calls.
#[unsafe(no_mangle)]
pub extern "C" fn isNextFaultInThisBB() -> bool {
    context().is_live_block()
}

fn corrupt<T: BitPattern>(
    kind: FaultKind,
    fault_index: c_int,
    inject_once: c_int,
    ef: c_int,
    tf: c_int,
    byte_val: c_int,
    value: T,
) -> T {
    let site = FaultSite {
        index: fault_index,
        inject_once: inject_once != 0,
        error_freq: ef,
        total_trials: tf,
        byte_position: byte_val,
    };
    context().corrupt(kind, site, value)
}

macro_rules! corruption_primitive {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $t:ty) => {
        $(#[$doc])*
        #[unsafe(no_mangle)]
        pub extern "C" fn $name(
            fault_index: c_int,
            inject_once: c_int,
            ef: c_int,
            tf: c_int,
            byte_val: c_int,
            value: $t,
        ) -> $t {
            corrupt($kind, fault_index, inject_once, ef, tf, byte_val, value)
        }
    };
}

/// Fault site producing a boolean.
///
/// The value arrives as a C `char`; any nonzero value is true.
#[unsafe(no_mangle)]
pub extern "C" fn corruptIntData_1bit(
    fault_index: c_int,
    inject_once: c_int,
    ef: c_int,
    tf: c_int,
    byte_val: c_int,
    value: c_char,
) -> bool {
    corrupt(
        FaultKind::Int1,
        fault_index,
        inject_once,
        ef,
        tf,
        byte_val,
        value != 0,
    )
}

corruption_primitive!(
    /// Fault site producing an 8-bit integer.
    corruptIntData_8bit, FaultKind::Int8, c_char
);
corruption_primitive!(
    /// Fault site producing a 16-bit integer.
    corruptIntData_16bit, FaultKind::Int16, c_short
);
corruption_primitive!(
    /// Fault site producing a 32-bit integer.
    corruptIntData_32bit, FaultKind::Int32, c_int
);
corruption_primitive!(
    /// Fault site producing a 64-bit integer.
    corruptIntData_64bit, FaultKind::Int64, c_longlong
);
corruption_primitive!(
    /// Fault site producing a single precision float.
    corruptFloatData_32bit, FaultKind::Float32, c_float
);
corruption_primitive!(
    /// Fault site producing a double precision float.
    corruptFloatData_64bit, FaultKind::Float64, c_double
);
corruption_primitive!(
    /// Fault site producing a 32-bit integer address. Only the low 32 bits are
    /// flipped.
    corruptIntAdr_32bit, FaultKind::Addr32(Pointee::Int), *mut c_int
);
corruption_primitive!(
    /// Fault site producing a 64-bit integer address.
    corruptIntAdr_64bit, FaultKind::Addr64(Pointee::Int), *mut c_longlong
);
corruption_primitive!(
    /// Fault site producing a 32-bit float address. Only the low 32 bits are
    /// flipped.
    corruptFloatAdr_32bit, FaultKind::Addr32(Pointee::Float), *mut c_float
);
corruption_primitive!(
    /// Fault site producing a 64-bit float address.
    corruptFloatAdr_64bit, FaultKind::Addr64(Pointee::Float), *mut c_double
);

/// Ends the campaign: logs the statistics and writes the output files.
///
/// Only the first call, explicit or from the shutdown hook, has an effect.
#[unsafe(no_mangle)]
pub extern "C" fn finalizeFaultInjectionCampaign() {
    finalize();
}

/// Same as [`finalizeFaultInjectionCampaign`]. Always returns 0.
#[unsafe(no_mangle)]
pub extern "C" fn print_faultStatistics() -> c_int {
    finalize();
    0
}

/// Logs the number of fault sites enumerated so far.
#[unsafe(no_mangle)]
pub extern "C" fn __printInstCount() {
    info!(
        "Total # fault sites enumerated : {}",
        context().statistics().fault_site_count()
    );
}

/// Writes the fault site histogram, if enabled.
#[unsafe(no_mangle)]
pub extern "C" fn writeFaultSiteHitHistogram() {
    match context().write_histogram(HISTOGRAM_FILE) {
        Ok(true) => {}
        Ok(false) => debug!("Fault site histogram disabled, nothing written"),
        Err(e) => warn!("Failed to write fault site histogram: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    // The context is process-wide, so the whole protocol runs in one test.
    #[test]
    fn test_campaign_protocol() {
        initializeFaultInjectionCampaign(1, 1);
        assert_eq!(context().scheduler().max_fault_interval(), 1);

        let name = CString::new("entry").unwrap();
        unsafe { enterFaultSiteBlock(name.as_ptr(), 4) };
        assert!(isNextFaultInThisBB());

        let value = corruptIntData_32bit(0, 0, 1, 1, -1, 0);
        assert_eq!(value.count_ones(), 1);
        let value = corruptFloatData_64bit(1, 0, 1, 1, -1, 1.0);
        assert_eq!((value.to_bits() ^ 1.0f64.to_bits()).count_ones(), 1);
        let ptr = corruptIntAdr_64bit(2, 0, 1, 1, -1, 0x1000 as *mut c_longlong);
        assert_eq!((ptr as usize ^ 0x1000).count_ones(), 1);
        let ptr = corruptFloatAdr_32bit(3, 0, 1, 1, -1, 0x1000 as *mut c_float);
        assert_eq!((ptr as usize ^ 0x1000).count_ones(), 1);
        assert!((ptr as usize ^ 0x1000).trailing_zeros() < 32);
        assert!(corruptIntData_1bit(4, 0, 1, 1, -1, 0));
        // any nonzero char is true
        assert!(!corruptIntData_1bit(4, 0, 1, 1, -1, 2));
        assert!(!corruptIntData_1bit(4, 0, 1, 1, -1, 0x80u8 as c_char));

        {
            let ctx = context();
            assert_eq!(ctx.statistics().fault_site_count(), 7);
            assert_eq!(ctx.statistics().fault_injection_count(), 7);
            assert_eq!(ctx.last_injection().map(|r| r.fault_index), Some(4));
        }

        // inject-once stops data faults after the first injection
        assert_eq!(corruptIntData_16bit(5, 1, 1, 1, -1, 7), 7);
        assert_eq!(corruptIntData_8bit(6, 0, 1, 1, -1, 7), 7);
        // addresses are tracked separately, but no further fault is scheduled
        let ptr = corruptIntAdr_32bit(7, 0, 1, 1, -1, 0x1000 as *mut c_int);
        assert_ne!(ptr as usize, 0x1000);
        assert!(context().scheduler().is_disabled());

        incrementFaultSiteCount(10);
        assert!(!isNextFaultInThisBB());
        assert_eq!(context().statistics().fault_site_count(), 20);
        assert_eq!(context().statistics().fault_injection_count(), 8);

        __printInstCount();
        writeFaultSiteHitHistogram();
        finalizeFaultInjectionCampaign();
        assert!(context().is_finalized());
        assert_eq!(print_faultStatistics(), 0);
    }
}
