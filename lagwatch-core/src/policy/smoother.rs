// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Exponential smoothing of replica targets.

use std::collections::HashMap;

use crate::types::FunctionKey;

use super::{ActivityCounts, PolicyContext, ReplicaCounts, ScalingStage};

/// Moves each function's replica count a fraction `greed` of the way toward
/// its target on every tick, except that a function with no running
/// replicas gets one immediately.
#[derive(Debug, Clone)]
pub struct Smoother {
    greed: f64,
    memory: HashMap<FunctionKey, f64>,
}

impl Smoother {
    pub fn new(greed: f64) -> Self {
        Self {
            greed,
            memory: HashMap::new(),
        }
    }

    /// Smoothed value retained for a function, if any.
    pub fn memory(&self, function: &FunctionKey) -> Option<f64> {
        self.memory.get(function).copied()
    }
}

impl ScalingStage for Smoother {
    fn name(&self) -> &'static str {
        "smoother"
    }

    fn transform(
        &mut self,
        replicas: ReplicaCounts,
        activity: ActivityCounts,
        ctx: &PolicyContext<'_>,
    ) -> (ReplicaCounts, ActivityCounts) {
        let mut memory = HashMap::with_capacity(replicas.len());
        let mut smoothed = ReplicaCounts::with_capacity(replicas.len());

        for (function, target) in replicas {
            let value = if target > 0 && ctx.actual(&function) == 0 {
                // Cold start
                1.0
            } else {
                let previous = self.memory.get(&function).copied().unwrap_or(0.0);
                previous + (f64::from(target) - previous) * self.greed
            };
            smoothed.insert(function.clone(), value.round() as u32);
            memory.insert(function, value);
        }

        // Functions absent from this proposal lose their history.
        self.memory = memory;
        (smoothed, activity)
    }
}
