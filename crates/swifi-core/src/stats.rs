//! Fault site statistics.

use crate::corrupt::FaultKind;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Monotonic counters describing a campaign.
///
/// `fault_site_count` counts every fault site enumerated, including sites of
/// blocks the gate let through on the fast path. The per-category counters only
/// see sites evaluated by a corruption primitive, since a fast-pathed block is
/// counted as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    fault_site_count: u64,
    fault_injection_count: u64,
    #[serde(serialize_with = "serialize_per_kind")]
    sites: [u64; FaultKind::COUNT],
    #[serde(serialize_with = "serialize_per_kind")]
    injections: [u64; FaultKind::COUNT],
    blocks_entered: u64,
    fast_path_blocks: u64,
}

fn serialize_per_kind<S: Serializer>(
    counts: &[u64; FaultKind::COUNT],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(FaultKind::COUNT))?;
    for kind in FaultKind::ALL {
        map.serialize_entry(kind.name(), &counts[kind.slot()])?;
    }
    map.end()
}

impl Statistics {
    /// Records one site evaluated by a corruption primitive.
    pub fn record_site(&mut self, kind: FaultKind) {
        self.fault_site_count += 1;
        self.sites[kind.slot()] += 1;
    }

    /// Records one injected fault.
    pub fn record_injection(&mut self, kind: FaultKind) {
        self.fault_injection_count += 1;
        self.injections[kind.slot()] += 1;
    }

    /// Records a block entry; fast-pathed blocks count their sites in bulk.
    pub fn record_block(&mut self, fast_path_sites: Option<u32>) {
        self.blocks_entered += 1;
        if let Some(sites) = fast_path_sites {
            self.fast_path_blocks += 1;
            self.fault_site_count += sites as u64;
        }
    }

    /// Total number of fault sites enumerated.
    pub fn fault_site_count(&self) -> u64 {
        self.fault_site_count
    }

    /// Total number of faults injected.
    pub fn fault_injection_count(&self) -> u64 {
        self.fault_injection_count
    }

    /// Sites of one category evaluated by a corruption primitive.
    pub fn sites(&self, kind: FaultKind) -> u64 {
        self.sites[kind.slot()]
    }

    /// Faults injected into one category.
    pub fn injections(&self, kind: FaultKind) -> u64 {
        self.injections[kind.slot()]
    }

    /// Number of basic blocks entered.
    pub fn blocks_entered(&self) -> u64 {
        self.blocks_entered
    }

    /// Number of basic blocks served by the fast path.
    pub fn fast_path_blocks(&self) -> u64 {
        self.fast_path_blocks
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "/*********************Fault Injection Statistics****************************/"
        )?;
        writeln!(
            f,
            "Total # fault sites enumerated : {}",
            self.fault_site_count
        )?;
        writeln!(
            f,
            "Total # faults injected : {}",
            self.fault_injection_count
        )?;
        writeln!(
            f,
            "Total # basic blocks entered : {} ({} on the fast path)",
            self.blocks_entered, self.fast_path_blocks
        )?;
        writeln!(f, "Further sub-categorization of fault sites below:")?;
        for kind in FaultKind::ALL {
            writeln!(
                f,
                "Total # {} fault sites enumerated : {} ({} injected)",
                kind.description(),
                self.sites(kind),
                self.injections(kind)
            )?;
        }
        write!(
            f,
            "/*********************************End**************************************/"
        )
    }
}
