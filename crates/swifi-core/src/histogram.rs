//! Per fault site hit histogram.

use crate::util::{HISTOGRAM_DENSE_LIMIT, HISTOGRAM_INITIAL_CAPACITY};
use itertools::Itertools;
use log::trace;
use std::collections::BTreeMap;
use std::io::Write;

/// Counts how often each fault site was evaluated, indexed by fault site index.
///
/// The buffer doubles whenever an index beyond its capacity is recorded. Existing
/// counts survive the growth and the new region starts at zero. The buffer never
/// grows past [`HISTOGRAM_DENSE_LIMIT`] slots; hits of higher indices go to a
/// sparse map. Counts saturate at `u32::MAX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultSiteHistogram {
    counts: Vec<u32>,
    sparse: BTreeMap<usize, u32>,
}

impl Default for FaultSiteHistogram {
    fn default() -> Self {
        Self::with_capacity(HISTOGRAM_INITIAL_CAPACITY)
    }
}

impl FaultSiteHistogram {
    /// Creates a histogram with `capacity` zeroed slots (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counts: vec![0; capacity.max(1)],
            sparse: BTreeMap::new(),
        }
    }

    /// Number of dense slots currently allocated.
    pub fn capacity(&self) -> usize {
        self.counts.len()
    }

    /// Records one evaluation of fault site `index`.
    ///
    /// Negative indices carry no site identity and are ignored.
    pub fn record(&mut self, index: i32) {
        let Ok(index) = usize::try_from(index) else {
            trace!("Ignoring histogram hit for negative fault site {}", index);
            return;
        };
        if index >= HISTOGRAM_DENSE_LIMIT.max(self.counts.len()) {
            let hits = self.sparse.entry(index).or_default();
            *hits = hits.saturating_add(1);
            return;
        }
        while index >= self.counts.len() {
            let capacity = (self.counts.len() * 2).min(HISTOGRAM_DENSE_LIMIT);
            trace!("Growing fault site histogram to {} slots", capacity);
            self.counts.resize(capacity, 0);
        }
        self.counts[index] = self.counts[index].saturating_add(1);
    }

    /// Number of recorded evaluations of fault site `index`.
    pub fn hits(&self, index: i32) -> u32 {
        usize::try_from(index)
            .ok()
            .and_then(|i| {
                self.counts
                    .get(i)
                    .or_else(|| self.sparse.get(&i))
                    .copied()
            })
            .unwrap_or(0)
    }

    /// `(index, hits)` pairs of every site hit at least once, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.counts
            .iter()
            .positions(|&hits| hits > 0)
            .map(|index| (index, self.counts[index]))
            .chain(self.sparse.iter().map(|(&index, &hits)| (index, hits)))
    }

    /// Writes the histogram in its tab-separated text format.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "FaultSiteIndex\tNumOfEnumeration")?;
        for (index, hits) in self.iter() {
            writeln!(writer, "{}\t{}", index, hits)?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_iter() {
        let mut hist = FaultSiteHistogram::default();
        hist.record(3);
        hist.record(3);
        hist.record(0);
        hist.record(-1);
        assert_eq!(hist.hits(3), 2);
        assert_eq!(hist.hits(0), 1);
        assert_eq!(hist.hits(-1), 0);
        assert_eq!(hist.iter().collect::<Vec<_>>(), vec![(0, 1), (3, 2)]);
    }

    #[test]
    fn test_growth_preserves_counts() {
        let mut hist = FaultSiteHistogram::with_capacity(4);
        for index in 0..4 {
            hist.record(index);
        }
        hist.record(4);
        assert_eq!(hist.capacity(), 8);
        // far beyond a single doubling
        hist.record(100);
        assert_eq!(hist.capacity(), 128);
        for index in 0..=4 {
            assert_eq!(hist.hits(index), 1, "lost count of site {}", index);
        }
        assert_eq!(hist.hits(100), 1);
        assert_eq!(hist.hits(50), 0);
        assert_eq!(hist.hits(1000), 0);
    }

    #[test]
    fn test_default_capacity_growth() {
        let mut hist = FaultSiteHistogram::default();
        assert_eq!(hist.capacity(), HISTOGRAM_INITIAL_CAPACITY);
        hist.record(999);
        hist.record(1000);
        hist.record(1000);
        assert_eq!(hist.capacity(), 2 * HISTOGRAM_INITIAL_CAPACITY);
        assert_eq!(hist.hits(999), 1);
        assert_eq!(hist.hits(1000), 2);
    }

    #[test]
    fn test_far_index_stays_sparse() -> anyhow::Result<()> {
        let mut hist = FaultSiteHistogram::with_capacity(4);
        hist.record(i32::MAX);
        hist.record(i32::MAX);
        hist.record(2);
        assert_eq!(hist.capacity(), 4);
        assert_eq!(hist.hits(i32::MAX), 2);
        hist.record(HISTOGRAM_DENSE_LIMIT as i32 - 1);
        assert_eq!(hist.capacity(), HISTOGRAM_DENSE_LIMIT);
        assert_eq!(
            hist.iter().collect::<Vec<_>>(),
            vec![
                (2, 1),
                (HISTOGRAM_DENSE_LIMIT - 1, 1),
                (i32::MAX as usize, 2)
            ]
        );
        let mut out = Vec::new();
        hist.write_to(&mut out)?;
        assert!(String::from_utf8(out)?.ends_with("\n2147483647\t2\n"));
        Ok(())
    }

    #[test]
    fn test_write_format() -> anyhow::Result<()> {
        let mut hist = FaultSiteHistogram::with_capacity(2);
        hist.record(5);
        hist.record(1);
        hist.record(5);
        let mut out = Vec::new();
        hist.write_to(&mut out)?;
        assert_eq!(
            String::from_utf8(out)?,
            "FaultSiteIndex\tNumOfEnumeration\n1\t1\n5\t2\n"
        );
        Ok(())
    }
}
