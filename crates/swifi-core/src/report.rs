//! Injection diagnostics and campaign reports.

use crate::config::CampaignConfig;
use crate::corrupt::FaultKind;
use crate::stats::Statistics;
use serde::Serialize;
use std::fmt;

/// Diagnostic record of one injected fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionRecord {
    /// Category of the corrupted value
    pub kind: FaultKind,
    /// Index of the flipped bit within the value's bit pattern
    pub bit_position: u32,
    /// Fault site the fault was injected at
    pub fault_index: i32,
    /// Error frequency as passed by the call site
    pub error_freq: i32,
    /// Total trials as passed by the call site
    pub total_trials: i32,
    /// Faults injected so far, including this one
    pub injections: u64,
    /// Fault sites enumerated so far, including this one
    pub sites_enumerated: u64,
}

impl fmt::Display for InjectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "/*********************************Start**************************************/"
        )?;
        writeln!(f, "Successfully injected {}!!", self.kind)?;
        writeln!(f, "Total # faults injected : {}", self.injections)?;
        writeln!(f, "Bit position is: {}", self.bit_position)?;
        writeln!(f, "Index of the fault site : {}", self.fault_index)?;
        writeln!(
            f,
            "User defined probability is: {}/{}",
            self.error_freq, self.total_trials
        )?;
        writeln!(
            f,
            "Total # of fault sites enumerated: {}",
            self.sites_enumerated
        )?;
        write!(
            f,
            "/*********************************End**************************************/"
        )
    }
}

/// Machine-readable summary of a campaign.
#[derive(Debug, Serialize)]
pub struct CampaignReport {
    /// ISO 8601 timestamp of when the report was taken
    date: String,
    /// Seed of the campaign's random number generator
    seed: u64,
    /// Campaign configuration
    config: CampaignConfig,
    /// Counters at the time of the report
    statistics: Statistics,
    /// The most recent injection, if any
    last_injection: Option<InjectionRecord>,
}

impl CampaignReport {
    pub(crate) fn new(
        seed: u64,
        config: CampaignConfig,
        statistics: Statistics,
        last_injection: Option<InjectionRecord>,
    ) -> Self {
        Self {
            date: chrono::Local::now().to_rfc3339(),
            seed,
            config,
            statistics,
            last_injection,
        }
    }

    /// Seed of the campaign's random number generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Counters at the time of the report.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrupt::Pointee;

    #[test]
    fn test_record_banner() {
        let record = InjectionRecord {
            kind: FaultKind::Addr64(Pointee::Int),
            bit_position: 12,
            fault_index: 42,
            error_freq: 1,
            total_trials: 1000,
            injections: 1,
            sites_enumerated: 77,
        };
        let text = record.to_string();
        assert!(text.contains("Successfully injected Ptr64 Error!!"));
        assert!(text.contains("Bit position is: 12"));
        assert!(text.contains("Index of the fault site : 42"));
        assert!(text.contains("User defined probability is: 1/1000"));
        assert!(text.contains("Total # of fault sites enumerated: 77"));
    }

    #[test]
    fn test_report_serializes() -> anyhow::Result<()> {
        let report = CampaignReport::new(9, CampaignConfig::new(1, 10), Statistics::default(), None);
        let json = serde_json::to_value(&report)?;
        assert_eq!(json["seed"], 9);
        assert_eq!(json["config"]["max_fault_interval"], 10);
        assert!(json["date"].is_string());
        assert!(json["last_injection"].is_null());
        Ok(())
    }
}
