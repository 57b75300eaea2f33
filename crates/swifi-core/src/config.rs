//! Campaign configuration.
//!
//! A campaign is parameterized by the error frequency `ef` and the total number of
//! trials `tf` supplied by the instrumented program, refined by an optional
//! line-oriented `key=value` file (see [`CONFIG_FILE`](crate::util::CONFIG_FILE)).
//! Configuration problems are never fatal: unknown keys and malformed values are
//! logged and skipped, and a missing file leaves the defaults in place.

use log::{debug, info};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a single configuration line.
///
/// These never abort a campaign; the offending line is skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The line has no `=` separating key and value.
    #[error("Missing '=' in configuration line")]
    MissingSeparator,
    /// The key is not recognized.
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
    /// The value could not be parsed for the given key.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Configuration key
        key: String,
        /// Raw value as found in the file
        value: String,
    },
}

/// A single recognized configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    /// `initial_next_fault_countdown=<int>`
    InitialCountdown(i64),
    /// `rand_flag=<0|1>`
    RandFlag(bool),
    /// `enable_fault_site_hist=<0|1>`
    EnableHistogram(bool),
    /// `bit_position=<int>`, negative selects a random bit
    BitPosition(Option<u32>),
    /// `dump_bb_trace=<0|1>`
    DumpBlockTrace(bool),
    /// `inject_once=<0|1>`
    InjectOnce(bool),
    /// `rand_seed=<u64>`
    RandSeed(u64),
    /// `dump_stats_json=<0|1>`
    DumpStatsJson(bool),
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_value::<i64>(key, value).map(|v| v != 0)
}

impl FromStr for Setting {
    type Err = ConfigError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let line = line.strip_prefix('-').unwrap_or(line);
        let (key, value) = line
            .split_once('=')
            .ok_or(ConfigError::MissingSeparator)?;
        let (key, value) = (key.trim(), value.trim());
        match key {
            "initial_next_fault_countdown" => {
                parse_value(key, value).map(Setting::InitialCountdown)
            }
            "rand_flag" => parse_flag(key, value).map(Setting::RandFlag),
            "enable_fault_site_hist" => parse_flag(key, value).map(Setting::EnableHistogram),
            "bit_position" => {
                let pos: i64 = parse_value(key, value)?;
                if pos < 0 {
                    Ok(Setting::BitPosition(None))
                } else {
                    u32::try_from(pos)
                        .map(|pos| Setting::BitPosition(Some(pos)))
                        .map_err(|_| ConfigError::InvalidValue {
                            key: key.to_owned(),
                            value: value.to_owned(),
                        })
                }
            }
            "dump_bb_trace" => parse_flag(key, value).map(Setting::DumpBlockTrace),
            "inject_once" => parse_flag(key, value).map(Setting::InjectOnce),
            "rand_seed" => parse_value(key, value).map(Setting::RandSeed),
            "dump_stats_json" => parse_flag(key, value).map(Setting::DumpStatsJson),
            _ => Err(ConfigError::UnknownKey(key.to_owned())),
        }
    }
}

/// Mean number of fault site evaluations between two injections, `ceil(tf / ef)`.
///
/// An error frequency of zero yields zero, which disables injection.
pub fn max_fault_interval(error_freq: u32, total_trials: u32) -> i64 {
    if error_freq == 0 {
        return 0;
    }
    (total_trials as u64).div_ceil(error_freq as u64) as i64
}

/// Campaign parameters, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignConfig {
    /// Requested number of errors per `total_trials` fault sites
    pub error_freq: u32,
    /// Number of fault sites the error frequency refers to
    pub total_trials: u32,
    /// `ceil(total_trials / error_freq)`
    pub max_fault_interval: i64,
    /// Explicit first countdown; drawn from the interval when absent
    pub initial_countdown: Option<i64>,
    /// Campaign-wide bit position; `None` selects bits randomly
    pub bit_position: Option<u32>,
    /// Inject at most one fault of each category for the whole run
    pub inject_once: bool,
    /// Seed the generator from the wall clock
    pub randomize_seed: bool,
    /// Explicit generator seed, takes precedence over `randomize_seed`
    pub seed: Option<u64>,
    /// Record a per-site hit histogram
    pub enable_histogram: bool,
    /// Log every basic block entry
    pub dump_block_trace: bool,
    /// Write a JSON campaign report on finalization
    pub dump_stats_json: bool,
}

impl CampaignConfig {
    /// Creates a configuration for the given rate with default settings.
    pub fn new(error_freq: u32, total_trials: u32) -> Self {
        Self {
            error_freq,
            total_trials,
            max_fault_interval: max_fault_interval(error_freq, total_trials),
            initial_countdown: None,
            bit_position: None,
            inject_once: false,
            randomize_seed: true,
            seed: None,
            enable_histogram: false,
            dump_block_trace: false,
            dump_stats_json: false,
        }
    }

    /// A configuration that never injects.
    ///
    /// Used by a runtime before the instrumented program started its campaign.
    pub fn disabled() -> Self {
        Self {
            initial_countdown: Some(-1),
            randomize_seed: false,
            ..Self::new(0, 0)
        }
    }

    /// Applies a single setting.
    pub fn apply(&mut self, setting: Setting) {
        match setting {
            Setting::InitialCountdown(countdown) => {
                info!("   Next fault CountDown = {}", countdown);
                self.initial_countdown = Some(countdown);
            }
            Setting::RandFlag(flag) => {
                info!("   Should initialize randseed = {}", flag as u8);
                self.randomize_seed = flag;
            }
            Setting::EnableHistogram(flag) => {
                if flag {
                    info!("   Will print fault site histogram");
                }
                self.enable_histogram = flag;
            }
            Setting::BitPosition(pos) => {
                match pos {
                    Some(pos) => info!("   Bit position = {}", pos),
                    None => info!("   Bit position = random"),
                }
                self.bit_position = pos;
            }
            Setting::DumpBlockTrace(flag) => {
                info!("   Dump basic block trace = {}", flag as u8);
                self.dump_block_trace = flag;
            }
            Setting::InjectOnce(flag) => {
                info!("   Inject once = {}", flag as u8);
                self.inject_once = flag;
            }
            Setting::RandSeed(seed) => {
                info!("   Random seed = {}", seed);
                self.seed = Some(seed);
            }
            Setting::DumpStatsJson(flag) => {
                info!("   Dump JSON statistics = {}", flag as u8);
                self.dump_stats_json = flag;
            }
        }
    }

    /// Applies every recognized setting found in `text`.
    ///
    /// Blank lines and `#` comments are skipped silently; any other
    /// unparseable line is logged and skipped.
    ///
    /// # Returns
    ///
    /// The number of settings applied.
    pub fn apply_str(&mut self, text: &str) -> usize {
        let mut applied = 0;
        for (lineno, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match trimmed.parse::<Setting>() {
                Ok(setting) => {
                    self.apply(setting);
                    applied += 1;
                }
                Err(e) => debug!("Ignoring configuration line {}: {}", lineno + 1, e),
            }
        }
        applied
    }

    /// Applies the settings of a configuration file.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if the file does not exist, `Ok(true)` once it was applied.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be read.
    pub fn apply_file<P: AsRef<Path>>(&mut self, path: P) -> std::io::Result<bool> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => {
                info!("   Injection campaign configuration found.");
                self.apply_str(&text);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("   Injection campaign configuration not found.");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_fault_interval() {
        assert_eq!(max_fault_interval(1, 1), 1);
        assert_eq!(max_fault_interval(1, 1_000_000), 1_000_000);
        assert_eq!(max_fault_interval(3, 10), 4);
        assert_eq!(max_fault_interval(5, 10), 2);
        assert_eq!(max_fault_interval(1, 0), 0);
        assert_eq!(max_fault_interval(0, 10), 0);
    }

    #[test]
    fn test_parse_known_keys() {
        assert_eq!(
            "-initial_next_fault_countdown=42".parse::<Setting>(),
            Ok(Setting::InitialCountdown(42))
        );
        assert_eq!("-rand_flag=0".parse::<Setting>(), Ok(Setting::RandFlag(false)));
        assert_eq!(
            "-enable_fault_site_hist=1".parse::<Setting>(),
            Ok(Setting::EnableHistogram(true))
        );
        assert_eq!("-bit_position=-1".parse::<Setting>(), Ok(Setting::BitPosition(None)));
        assert_eq!("-bit_position=7".parse::<Setting>(), Ok(Setting::BitPosition(Some(7))));
        assert_eq!("-dump_bb_trace=1".parse::<Setting>(), Ok(Setting::DumpBlockTrace(true)));
        assert_eq!("inject_once = 1".parse::<Setting>(), Ok(Setting::InjectOnce(true)));
        assert_eq!("-rand_seed=99".parse::<Setting>(), Ok(Setting::RandSeed(99)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            "-rand_flag".parse::<Setting>(),
            Err(ConfigError::MissingSeparator)
        );
        assert_eq!(
            "-frobnicate=1".parse::<Setting>(),
            Err(ConfigError::UnknownKey("frobnicate".into()))
        );
        assert!(matches!(
            "-initial_next_fault_countdown=soon".parse::<Setting>(),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            "-bit_position=99999999999".parse::<Setting>(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_apply_str_skips_bad_lines() {
        let mut config = CampaignConfig::new(1, 100);
        let applied = config.apply_str(
            "# campaign\n\
             -initial_next_fault_countdown=5\n\
             garbage\n\
             -bit_position=3\n\
             -unknown=1\n\
             -enable_fault_site_hist=1\n",
        );
        assert_eq!(applied, 3);
        assert_eq!(config.initial_countdown, Some(5));
        assert_eq!(config.bit_position, Some(3));
        assert!(config.enable_histogram);
        assert!(config.randomize_seed);
    }

    #[test]
    fn test_apply_missing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = CampaignConfig::new(1, 10);
        let before = config.clone();
        assert!(!config.apply_file(dir.path().join("fault_injection.conf"))?);
        assert_eq!(config, before);
        Ok(())
    }

    #[test]
    fn test_apply_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fault_injection.conf");
        std::fs::write(&path, "-rand_flag=0\n-dump_bb_trace=1\n")?;
        let mut config = CampaignConfig::new(1, 10);
        assert!(config.apply_file(&path)?);
        assert!(!config.randomize_seed);
        assert!(config.dump_block_trace);
        Ok(())
    }

    #[test]
    fn test_disabled() {
        let config = CampaignConfig::disabled();
        assert_eq!(config.max_fault_interval, 0);
        assert_eq!(config.initial_countdown, Some(-1));
    }
}
