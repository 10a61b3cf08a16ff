// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-partition log positions of a consumer group.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Subscription;

/// Sentinel for a position that has not been observed yet.
pub const UNKNOWN_OFFSET: i64 = -1;

/// Current and end positions of one partition, plus the current position
/// seen by the previous measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offsets {
    pub current: i64,
    pub end: i64,
    pub previous_current: i64,
}

impl Offsets {
    /// Offsets of a partition that has never been measured.
    pub const fn unknown() -> Self {
        Self {
            current: UNKNOWN_OFFSET,
            end: UNKNOWN_OFFSET,
            previous_current: UNKNOWN_OFFSET,
        }
    }

    /// Offsets with no history.
    pub const fn new(current: i64, end: i64) -> Self {
        Self {
            current,
            end,
            previous_current: UNKNOWN_OFFSET,
        }
    }

    /// Messages available that haven't been handled yet. Never negative: a
    /// current position briefly ahead of the end counts as no lag.
    pub fn lag(&self) -> i64 {
        (self.end - self.current).max(0)
    }

    /// Messages handled since the previous measurement, 0 if unknown.
    pub fn activity(&self) -> i64 {
        if self.previous_current != UNKNOWN_OFFSET {
            self.current - self.previous_current
        } else {
            0
        }
    }
}

impl Default for Offsets {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for Offsets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.previous_current != UNKNOWN_OFFSET {
            write!(
                f,
                "Offsets[lag={} (={}-{}), Activity:{} (={}-{})]",
                self.lag(),
                self.end,
                self.current,
                self.activity(),
                self.current,
                self.previous_current
            )
        } else {
            write!(
                f,
                "Offsets[lag={} (={}-{}), Activity:{} (unknown)]",
                self.lag(),
                self.end,
                self.current,
                self.activity()
            )
        }
    }
}

/// Offsets keyed by partition index, ordered by partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionedOffsets(BTreeMap<i32, Offsets>);

impl PartitionedOffsets {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Offsets for the given lags, each partition starting at position 0.
    pub fn from_lags(lags: &[i64]) -> Self {
        lags.iter()
            .enumerate()
            .map(|(partition, &lag)| (partition as i32, Offsets::new(0, lag)))
            .collect()
    }

    pub fn insert(&mut self, partition: i32, offsets: Offsets) {
        self.0.insert(partition, offsets);
    }

    pub fn get(&self, partition: i32) -> Option<&Offsets> {
        self.0.get(&partition)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &Offsets)> {
        self.0.iter().map(|(p, o)| (*p, o))
    }

    pub fn partitions(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest lag over all partitions, 0 when there are none.
    pub fn max_lag(&self) -> i64 {
        self.0.values().map(Offsets::lag).max().unwrap_or(0)
    }
}

impl FromIterator<(i32, Offsets)> for PartitionedOffsets {
    fn from_iter<I: IntoIterator<Item = (i32, Offsets)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PartitionedOffsets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (partition, offsets) in &self.0 {
            write!(f, "{}:{} ", partition, offsets)?;
        }
        Ok(())
    }
}

/// One measurement of every tracked subscription.
pub type LagSnapshot = HashMap<Subscription, PartitionedOffsets>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lag_and_activity() {
        let o = Offsets {
            current: 5,
            end: 12,
            previous_current: 2,
        };
        assert_eq!(o.lag(), 7);
        assert_eq!(o.activity(), 3);
    }

    #[test]
    fn test_negative_lag_is_clamped() {
        let o = Offsets::new(10, 8);
        assert_eq!(o.lag(), 0);
    }

    #[test]
    fn test_unknown_previous_means_no_activity() {
        let o = Offsets::new(10, 20);
        assert_eq!(o.activity(), 0);
        assert!(o.to_string().contains("(unknown)"));
    }

    #[test]
    fn test_max_lag() {
        let po = PartitionedOffsets::from_lags(&[2, 3, 10]);
        assert_eq!(po.max_lag(), 10);
        assert_eq!(PartitionedOffsets::new().max_lag(), 0);
    }

    #[test]
    fn test_display_sorted_by_partition() {
        let mut po = PartitionedOffsets::new();
        po.insert(2, Offsets::new(0, 1));
        po.insert(0, Offsets::new(0, 4));
        let rendered = po.to_string();
        assert!(rendered.starts_with("0:Offsets[lag=4"));
        assert!(rendered.contains("2:Offsets[lag=1"));
    }
}
