// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lag to replica count.
//!
//! Replicas are interpolated linearly between one replica at
//! `lag_required_for_one` and `max_replicas` at `lag_required_for_max`,
//! using the largest lag over the partitions of each input.

use crate::config::ControllerConfig;
use crate::metrics;
use crate::offsets::LagSnapshot;
use crate::types::Function;

use super::{ActivityCounts, PolicyContext, ReplicaCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasePolicy {
    lag_required_for_one: i64,
    lag_required_for_max: i64,
}

impl BasePolicy {
    pub const NAME: &'static str = "base";

    /// Calibrate the interpolation. `lag_required_for_max` must be greater
    /// than `lag_required_for_one`.
    pub fn new(lag_required_for_one: i64, lag_required_for_max: i64) -> Self {
        Self {
            lag_required_for_one,
            lag_required_for_max,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.lag_required_for_one, config.lag_required_for_max)
    }

    /// Replica cap for a function consuming a topic with `partitions`
    /// partitions: its explicit cap if set, never more than the partitions.
    pub fn max_replicas(function: Option<&Function>, partitions: u32) -> u32 {
        function
            .and_then(|f| f.max_replicas)
            .unwrap_or(partitions)
            .min(partitions)
    }

    /// Replicas warranted by the largest partition lag of one input.
    pub fn desired_replicas_for_topic(&self, max_partition_lag: i64, max_replicas: u32) -> u32 {
        let slope = (max_replicas as f64 - 1.0)
            / (self.lag_required_for_max - self.lag_required_for_one) as f64;

        let computed = if slope > 0.0 {
            // Rounds half up by truncating after adding 0.5.
            (1.0 + (max_partition_lag - self.lag_required_for_one) as f64 * slope + 0.5) as i64
        } else if max_partition_lag >= self.lag_required_for_one {
            1
        } else {
            0
        };

        computed.clamp(0, i64::from(max_replicas)) as u32
    }

    /// Desired replicas per function, the max over its inputs, together with
    /// the function's combined positions over every tracked partition.
    pub fn compute(
        &self,
        snapshot: &LagSnapshot,
        ctx: &PolicyContext<'_>,
    ) -> (ReplicaCounts, ActivityCounts) {
        let mut replicas = ReplicaCounts::new();
        let mut activity = ActivityCounts::new();

        for (subscription, offsets) in snapshot {
            let function = &subscription.group;
            let partitions = ctx.partition_count(&subscription.topic);
            let max_replicas = Self::max_replicas(ctx.functions.get(function), partitions);
            let max_lag = offsets.max_lag();
            let desired = self.desired_replicas_for_topic(max_lag, max_replicas);

            tracing::debug!(
                subscription = %subscription,
                max_lag,
                max_replicas,
                desired,
                "Computed desired replicas for input"
            );
            metrics::record_partition_lag(function, &subscription.topic, max_lag);

            replicas
                .entry(function.clone())
                .and_modify(|r| *r = (*r).max(desired))
                .or_insert(desired);

            let combined = activity.entry(function.clone()).or_default();
            for (_, o) in offsets.iter() {
                combined.current += o.current;
                combined.end += o.end;
            }
        }

        (replicas, activity)
    }
}
