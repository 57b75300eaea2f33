//! Basic block gate.
//!
//! Instrumented programs enter the gate once per basic block with the number of
//! fault sites the block holds. If the next fault cannot fall into the block, the
//! gate accounts for all of its sites at once and the program skips the
//! per-site corruption calls. Otherwise the block is live and every site goes
//! through a corruption primitive, which does its own accounting.

use crate::scheduler::Scheduler;
use crate::stats::Statistics;
use serde::Serialize;

/// Verdict of the gate for the current basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockVerdict {
    /// Per-site checks must run.
    Live,
    /// No fault can fire in this block; its sites were accounted in bulk.
    NoFault,
}

impl BlockVerdict {
    /// Whether per-site checks must run.
    pub fn is_live(self) -> bool {
        self == BlockVerdict::Live
    }
}

/// Caches the verdict for the block currently executing.
///
/// The verdict stays fixed until the next block is entered, even if a fault
/// fires inside the block. Sites of a live block are always evaluated one by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockGate {
    verdict: BlockVerdict,
}

impl Default for BlockGate {
    fn default() -> Self {
        Self {
            verdict: BlockVerdict::NoFault,
        }
    }
}

impl BlockGate {
    /// Enters a basic block holding `sites` fault sites.
    ///
    /// With the histogram enabled every block is live, since each site has to be
    /// recorded. Otherwise the block is live exactly when the pending countdown
    /// runs out within it. A disabled scheduler never makes a block live.
    pub fn enter(
        &mut self,
        sites: u32,
        scheduler: &mut Scheduler,
        stats: &mut Statistics,
        histogram_enabled: bool,
    ) -> BlockVerdict {
        let countdown = scheduler.countdown();
        self.verdict = if histogram_enabled || (0..=sites as i64).contains(&countdown) {
            stats.record_block(None);
            BlockVerdict::Live
        } else {
            scheduler.skip(sites);
            stats.record_block(Some(sites));
            BlockVerdict::NoFault
        };
        self.verdict
    }

    /// Verdict for the current block.
    pub fn verdict(&self) -> BlockVerdict {
        self.verdict
    }

    /// Whether per-site checks must run in the current block.
    pub fn is_live(&self) -> bool {
        self.verdict.is_live()
    }
}
