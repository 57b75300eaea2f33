use crate::config::CampaignConfig;
use crate::corrupt::{BitPattern, FaultClass, FaultKind, FaultSite, resolve_bit_position};
use crate::gate::{BlockGate, BlockVerdict};
use crate::histogram::FaultSiteHistogram;
use crate::report::{CampaignReport, InjectionRecord};
use crate::scheduler::Scheduler;
use crate::stats::Statistics;
use crate::util::{HISTOGRAM_FILE, Rng, STATS_FILE};
use log::{Level, debug, info, log_enabled, warn};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors raised while reporting a campaign.
///
/// Injection itself never fails; only writing results out can.
#[derive(Debug, Error)]
pub enum Error {
    /// Writing an output file failed.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// Serializing the campaign report failed.
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    /// The campaign was already finalized.
    #[error("Campaign already finalized")]
    AlreadyFinalized,
}

/// Logs `diagnostic` at info level, or writes it to `fallback` when info is
/// filtered out or no logger is installed.
fn emit_diagnostic<D: Display, W: Write>(diagnostic: &D, mut fallback: W) {
    if log_enabled!(Level::Info) {
        info!("\n{}", diagnostic);
    } else if let Err(e) = writeln!(fallback, "{}", diagnostic) {
        debug!("Failed to write diagnostic: {}", e);
    }
}

/// All state of one fault injection campaign.
///
/// Owns the configuration, the countdown scheduler, the basic block gate, the
/// statistics and the optional fault site histogram. An instrumented program
/// drives it through [`enter_block`](FaultInjectionContext::enter_block) and
/// [`corrupt`](FaultInjectionContext::corrupt), and ends it with
/// [`finalize`](FaultInjectionContext::finalize).
///
/// The context is not synchronized; a multi-threaded target must serialize
/// access to it.
#[derive(Debug)]
pub struct FaultInjectionContext {
    config: CampaignConfig,
    scheduler: Scheduler,
    gate: BlockGate,
    stats: Statistics,
    histogram: Option<FaultSiteHistogram>,
    rng: Rng,
    last_injection: Option<InjectionRecord>,
    finalized: bool,
}

impl Default for FaultInjectionContext {
    fn default() -> Self {
        Self::new(CampaignConfig::disabled())
    }
}

impl FaultInjectionContext {
    /// Creates a context for a fully specified configuration.
    ///
    /// The generator is seeded from `config.seed` if set, else from the wall
    /// clock if `config.randomize_seed`, else from the default seed. The first
    /// countdown is armed immediately.
    pub fn new(config: CampaignConfig) -> Self {
        let mut rng = match (config.seed, config.randomize_seed) {
            (Some(seed), _) => Rng::from_seed(seed),
            (None, true) => {
                info!("   Initialized randomization seed.");
                Rng::from_clock()
            }
            (None, false) => Rng::default(),
        };
        let mut scheduler = Scheduler::new(config.max_fault_interval);
        if config.inject_once {
            scheduler.set_inject_once(FaultClass::Data);
            scheduler.set_inject_once(FaultClass::Address);
        }
        scheduler.arm(config.initial_countdown, &mut rng);
        Self {
            histogram: config.enable_histogram.then(FaultSiteHistogram::default),
            config,
            scheduler,
            gate: BlockGate::default(),
            stats: Statistics::default(),
            rng,
            last_injection: None,
            finalized: false,
        }
    }

    /// Starts a campaign for `error_freq` faults per `total_trials` fault sites.
    ///
    /// Settings from `config_path` refine the defaults. A missing or unreadable
    /// file is not an error; the campaign proceeds with what it has.
    pub fn initialize<P: AsRef<Path>>(error_freq: u32, total_trials: u32, config_path: P) -> Self {
        info!("[Fault Injection Campaign details]");
        let mut config = CampaignConfig::new(error_freq, total_trials);
        info!("   Max interval: {}", config.max_fault_interval);
        if error_freq == 0 {
            warn!("Error frequency is zero, no faults will be injected");
        }
        if let Err(e) = config.apply_file(config_path) {
            warn!("Failed to read injection campaign configuration: {}", e);
        }
        Self::new(config)
    }

    /// Enters a basic block holding `sites` fault sites.
    ///
    /// `name` only appears in the block trace.
    pub fn enter_block(&mut self, name: Option<&str>, sites: u32) -> BlockVerdict {
        let verdict = self.gate.enter(
            sites,
            &mut self.scheduler,
            &mut self.stats,
            self.histogram.is_some(),
        );
        if self.config.dump_block_trace {
            info!(
                "BB {} ({} fault sites): {:?}, countdown {}",
                name.unwrap_or("<unnamed>"),
                sites,
                verdict,
                self.scheduler.countdown()
            );
        }
        verdict
    }

    /// Whether the current block needs its per-site corruption calls.
    pub fn is_live_block(&self) -> bool {
        self.gate.is_live()
    }

    /// Evaluates one fault site and possibly flips one bit of `value`.
    ///
    /// The site is always enumerated. A bit is flipped only if the scheduler
    /// fires here, inject-once does not forbid it, and a valid bit position
    /// exists for the category's width. The returned value is either `value`
    /// or `value` with exactly one bit inverted.
    pub fn corrupt<T: BitPattern>(&mut self, kind: FaultKind, site: FaultSite, value: T) -> T {
        if let Some(histogram) = self.histogram.as_mut() {
            histogram.record(site.index);
        }
        self.stats.record_site(kind);

        let class = kind.class();
        if site.inject_once {
            self.scheduler.set_inject_once(class);
        }
        if self.scheduler.inject_once(class) && self.stats.fault_injection_count() > 0 {
            return value;
        }
        if !self.scheduler.should_inject(&mut self.rng) {
            return value;
        }

        let width = kind.width().min(T::BITS);
        let Some(bit) = resolve_bit_position(
            width,
            self.config.bit_position,
            site.byte_position,
            &mut self.rng,
        ) else {
            debug!(
                "Bit position {:?} out of range for {}, skipping fault at site {}",
                self.config.bit_position, kind, site.index
            );
            return value;
        };

        self.stats.record_injection(kind);
        let record = InjectionRecord {
            kind,
            bit_position: bit,
            fault_index: site.index,
            error_freq: site.error_freq,
            total_trials: site.total_trials,
            injections: self.stats.fault_injection_count(),
            sites_enumerated: self.stats.fault_site_count(),
        };
        emit_diagnostic(&record, std::io::stderr());
        self.last_injection = Some(record);
        value.flip_bit(bit)
    }

    /// Campaign configuration.
    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Scheduler state.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Statistics collected so far.
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Fault site histogram, if enabled.
    pub fn histogram(&self) -> Option<&FaultSiteHistogram> {
        self.histogram.as_ref()
    }

    /// The most recent injection.
    pub fn last_injection(&self) -> Option<&InjectionRecord> {
        self.last_injection.as_ref()
    }

    /// Seed of the campaign's random number generator.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Whether [`finalize`](FaultInjectionContext::finalize) already ran.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Snapshot of the campaign for serialization.
    pub fn report(&self) -> CampaignReport {
        CampaignReport::new(
            self.seed(),
            self.config.clone(),
            self.stats.clone(),
            self.last_injection.clone(),
        )
    }

    /// Writes the fault site histogram to `path`.
    ///
    /// Falls back to standard error if `path` cannot be created.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if the histogram is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_histogram<P: AsRef<Path>>(&self, path: P) -> Result<bool, Error> {
        let Some(histogram) = &self.histogram else {
            return Ok(false);
        };
        let path = path.as_ref();
        match File::create(path) {
            Ok(file) => {
                histogram.write_to(BufWriter::new(file))?;
                info!("Fault site hit histogram saved to {}.", path.display());
            }
            Err(e) => {
                warn!(
                    "Failed to create {}: {}. Writing histogram to stderr",
                    path.display(),
                    e
                );
                histogram.write_to(std::io::stderr().lock())?;
            }
        }
        Ok(true)
    }

    /// Writes the JSON campaign report to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.report())?;
        info!("Campaign report saved to {}.", path.display());
        Ok(())
    }

    /// Ends the campaign.
    ///
    /// Logs the final statistics and writes the histogram and, if configured, the
    /// JSON report into `out_dir`. Runs at most once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyFinalized`] on every call after the first, or an
    /// error if an output file cannot be written.
    pub fn finalize<P: AsRef<Path>>(&mut self, out_dir: P) -> Result<&Statistics, Error> {
        if self.finalized {
            return Err(Error::AlreadyFinalized);
        }
        self.finalized = true;
        emit_diagnostic(&self.stats, std::io::stderr());
        let out_dir = out_dir.as_ref();
        self.write_histogram(out_dir.join(HISTOGRAM_FILE))?;
        if self.config.dump_stats_json {
            self.write_report(out_dir.join(STATS_FILE))?;
        }
        Ok(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrupt::Pointee;

    fn config(countdown: i64) -> CampaignConfig {
        CampaignConfig {
            initial_countdown: Some(countdown),
            seed: Some(1234),
            ..CampaignConfig::new(1, 100)
        }
    }

    #[test]
    fn test_default_never_injects() {
        let mut ctx = FaultInjectionContext::default();
        for i in 0..1000 {
            assert_eq!(ctx.corrupt(FaultKind::Int32, FaultSite::new(i), 7i32), 7);
        }
        assert_eq!(ctx.statistics().fault_site_count(), 1000);
        assert_eq!(ctx.statistics().fault_injection_count(), 0);
        assert!(ctx.last_injection().is_none());
    }

    #[test]
    fn test_injects_at_countdown() {
        let mut ctx = FaultInjectionContext::new(config(3));
        let site = FaultSite::new(1);
        assert_eq!(ctx.corrupt(FaultKind::Int64, site, 0i64), 0);
        assert_eq!(ctx.corrupt(FaultKind::Int64, site, 0i64), 0);
        let corrupted = ctx.corrupt(FaultKind::Int64, site, 0i64);
        let record = ctx.last_injection().expect("no injection recorded");
        assert_eq!(corrupted, 1i64 << record.bit_position);
        assert_eq!(record.injections, 1);
        assert_eq!(record.sites_enumerated, 3);
        assert_eq!(ctx.statistics().injections(FaultKind::Int64), 1);
    }

    #[test]
    fn test_explicit_bit_position() {
        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            bit_position: Some(5),
            ..config(1)
        });
        assert_eq!(ctx.corrupt(FaultKind::Int32, FaultSite::new(0), 0i32), 32);
    }

    #[test]
    fn test_out_of_range_bit_position_declines() {
        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            bit_position: Some(16),
            ..CampaignConfig::new(1, 1)
        });
        for i in 0..100 {
            assert_eq!(ctx.corrupt(FaultKind::Int16, FaultSite::new(i), 0x1234i16), 0x1234);
        }
        assert_eq!(ctx.statistics().fault_injection_count(), 0);
        assert_eq!(ctx.statistics().sites(FaultKind::Int16), 100);
    }

    #[test]
    fn test_bool_only_accepts_bit_zero() {
        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            bit_position: Some(0),
            ..CampaignConfig::new(1, 1)
        });
        assert!(ctx.corrupt(FaultKind::Int1, FaultSite::new(0), false));

        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            bit_position: Some(3),
            ..CampaignConfig::new(1, 1)
        });
        assert!(!ctx.corrupt(FaultKind::Int1, FaultSite::new(0), false));
        assert_eq!(ctx.statistics().fault_injection_count(), 0);
    }

    #[test]
    fn test_float_flip() {
        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            bit_position: Some(63),
            ..config(1)
        });
        assert_eq!(ctx.corrupt(FaultKind::Float64, FaultSite::new(0), 2.5f64), -2.5);
    }

    #[test]
    fn test_address_flip() {
        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            bit_position: Some(0),
            initial_countdown: Some(1),
            ..CampaignConfig::new(1, 1_000_000)
        });
        let ptr = 0x1000 as *mut i64;
        let corrupted = ctx.corrupt(FaultKind::Addr64(Pointee::Int), FaultSite::new(0), ptr);
        assert_eq!(corrupted as usize, 0x1001);
    }

    #[test]
    fn test_inject_once_per_call() {
        let mut ctx = FaultInjectionContext::new(CampaignConfig::new(1, 1));
        let site = FaultSite {
            inject_once: true,
            ..FaultSite::new(9)
        };
        let first = ctx.corrupt(FaultKind::Int32, site, 0i32);
        assert_ne!(first, 0);
        for _ in 0..100 {
            assert_eq!(ctx.corrupt(FaultKind::Int32, site, 0i32), 0);
            assert_eq!(ctx.corrupt(FaultKind::Int8, FaultSite::new(3), 0i8), 0);
        }
        assert_eq!(ctx.statistics().fault_injection_count(), 1);
        assert_eq!(ctx.statistics().fault_site_count(), 201);
        assert!(ctx.scheduler().is_disabled());
    }

    #[test]
    fn test_histogram_records_every_site() {
        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            enable_histogram: true,
            ..CampaignConfig::disabled()
        });
        ctx.enter_block(Some("entry"), 3);
        assert!(ctx.is_live_block());
        ctx.corrupt(FaultKind::Int8, FaultSite::new(2000), 1i8);
        ctx.corrupt(FaultKind::Int8, FaultSite::new(2), 1i8);
        ctx.corrupt(FaultKind::Int8, FaultSite::new(2), 1i8);
        let hist = ctx.histogram().expect("histogram enabled");
        assert_eq!(hist.hits(2), 2);
        assert_eq!(hist.hits(2000), 1);
        assert_eq!(ctx.statistics().fault_site_count(), 3);
    }

    #[test]
    fn test_finalize_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            enable_histogram: true,
            dump_stats_json: true,
            ..config(1)
        });
        ctx.corrupt(FaultKind::Int32, FaultSite::new(4), 0i32);
        assert_eq!(ctx.finalize(dir.path())?.fault_injection_count(), 1);
        assert!(ctx.is_finalized());
        assert!(matches!(
            ctx.finalize(dir.path()),
            Err(Error::AlreadyFinalized)
        ));
        let hist = std::fs::read_to_string(dir.path().join(HISTOGRAM_FILE))?;
        assert_eq!(hist, "FaultSiteIndex\tNumOfEnumeration\n4\t1\n");
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(STATS_FILE))?)?;
        assert_eq!(report["seed"], 1234);
        assert_eq!(report["statistics"]["fault_injection_count"], 1);
        Ok(())
    }

    /// Bits that differ between `value` and its corruption at an explicit
    /// campaign-wide position.
    fn flipped_bits(kind: FaultKind, bit: u32) -> u64 {
        let mut ctx = FaultInjectionContext::new(CampaignConfig {
            bit_position: Some(bit),
            seed: Some(bit as u64),
            ..CampaignConfig::new(1, 1)
        });
        let site = FaultSite::new(0);
        match kind {
            FaultKind::Int1 => ctx.corrupt(kind, site, false) as u64,
            FaultKind::Int8 => (ctx.corrupt(kind, site, 0x5au8) ^ 0x5a) as u64,
            FaultKind::Int16 => (ctx.corrupt(kind, site, -2i16) ^ -2) as u16 as u64,
            FaultKind::Int32 => (ctx.corrupt(kind, site, 0i32) as u32) as u64,
            FaultKind::Int64 => ctx.corrupt(kind, site, i64::MIN) as u64 ^ i64::MIN as u64,
            FaultKind::Float32 => (ctx.corrupt(kind, site, 1.5f32).to_bits() ^ 1.5f32.to_bits()) as u64,
            FaultKind::Float64 => ctx.corrupt(kind, site, -0.25f64).to_bits() ^ (-0.25f64).to_bits(),
            FaultKind::Addr32(_) | FaultKind::Addr64(_) => {
                let ptr = 0x1000usize as *mut u8;
                (ctx.corrupt(kind, site, ptr) as usize ^ 0x1000) as u64
            }
        }
    }

    #[test]
    fn test_explicit_position_flips_that_bit_for_every_kind() {
        for kind in FaultKind::ALL {
            let width = match kind.class() {
                FaultClass::Address => kind.width().min(usize::BITS),
                FaultClass::Data => kind.width(),
            };
            for bit in 0..width {
                assert_eq!(
                    flipped_bits(kind, bit),
                    1u64 << bit,
                    "{:?} at bit {}",
                    kind,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_diagnostic_without_logger_goes_to_fallback() -> anyhow::Result<()> {
        let mut stats = Statistics::default();
        stats.record_site(FaultKind::Int8);
        let mut out = Vec::new();
        emit_diagnostic(&stats, &mut out);
        let text = String::from_utf8(out)?;
        assert!(text.contains("Fault Injection Statistics"));
        assert!(text.contains("Total # fault sites enumerated : 1"));
        Ok(())
    }
}
