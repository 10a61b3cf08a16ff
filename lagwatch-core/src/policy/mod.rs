// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Scaling policy pipeline.
//!
//! A lag snapshot is turned into desired replica counts by the
//! [`BasePolicy`], then passed through an ordered list of
//! [`ScalingStage`]s. The standard pipeline is
//! `base -> smoother -> delayer`: the smoother sees raw lag-derived targets
//! and the delayer sees smoothed ones.

mod base;
mod delayer;
mod smoother;

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub use base::BasePolicy;
pub use delayer::Delayer;
pub use smoother::Smoother;

use crate::config::ControllerConfig;
use crate::offsets::LagSnapshot;
use crate::types::{Function, FunctionKey, Topic, TopicKey};

/// Desired replica count per function.
pub type ReplicaCounts = HashMap<FunctionKey, u32>;

/// Combined positions over all partitions of all of a function's inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activity {
    pub current: i64,
    pub end: i64,
}

/// Activity marker per function.
pub type ActivityCounts = HashMap<FunctionKey, Activity>;

/// Read-only controller state visible to the policy.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub functions: &'a HashMap<FunctionKey, Function>,
    pub topics: &'a HashMap<TopicKey, Topic>,
    pub actual_replicas: &'a HashMap<FunctionKey, u32>,
    pub now: Instant,
}

impl PolicyContext<'_> {
    /// Last known replica count, 0 when never observed.
    pub fn actual(&self, function: &FunctionKey) -> u32 {
        self.actual_replicas.get(function).copied().unwrap_or(0)
    }

    /// Partition count of a topic, 1 while the topic is unknown.
    pub fn partition_count(&self, topic: &TopicKey) -> u32 {
        self.topics.get(topic).map(Topic::partition_count).unwrap_or(1)
    }

    pub fn idle_timeout(&self, function: &FunctionKey) -> Option<Duration> {
        self.functions.get(function).and_then(Function::idle_timeout)
    }
}

/// One transformation of the replica proposal.
///
/// Stages receive the previous stage's output by value and return fresh
/// maps; they never see what a later stage does with them.
pub trait ScalingStage: Send {
    fn name(&self) -> &'static str;

    fn transform(
        &mut self,
        replicas: ReplicaCounts,
        activity: ActivityCounts,
        ctx: &PolicyContext<'_>,
    ) -> (ReplicaCounts, ActivityCounts);
}

/// The base policy followed by its stages, in application order.
pub struct ScalingPolicy {
    base: BasePolicy,
    stages: Vec<Box<dyn ScalingStage>>,
}

impl ScalingPolicy {
    /// A policy made of the base policy alone.
    pub fn new(base: BasePolicy) -> Self {
        Self {
            base,
            stages: Vec::new(),
        }
    }

    /// Base policy, smoother and delayer calibrated from the configuration.
    pub fn standard(config: &ControllerConfig) -> Self {
        Self::new(BasePolicy::from_config(config))
            .with_stage(Smoother::new(config.smoother_greed))
            .with_stage(Delayer::new(config.default_idle_timeout))
    }

    /// Append a stage, run after all existing ones.
    pub fn with_stage(mut self, stage: impl ScalingStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Names of the pipeline steps in the order they run.
    pub fn stage_names(&self) -> Vec<&'static str> {
        std::iter::once(BasePolicy::NAME)
            .chain(self.stages.iter().map(|s| s.name()))
            .collect()
    }

    /// Run the whole pipeline over a lag snapshot.
    pub fn propose(&mut self, snapshot: &LagSnapshot, ctx: &PolicyContext<'_>) -> ReplicaCounts {
        let (mut replicas, mut activity) = self.base.compute(snapshot, ctx);
        for stage in &mut self.stages {
            let (r, a) = stage.transform(replicas, activity, ctx);
            tracing::trace!(stage = stage.name(), replicas = ?r, "Scaling stage applied");
            replicas = r;
            activity = a;
        }
        replicas
    }
}

impl std::fmt::Debug for ScalingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalingPolicy")
            .field("base", &self.base)
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offsets::PartitionedOffsets;
    use crate::types::Subscription;

    struct Doubler;

    impl ScalingStage for Doubler {
        fn name(&self) -> &'static str {
            "doubler"
        }

        fn transform(
            &mut self,
            replicas: ReplicaCounts,
            activity: ActivityCounts,
            _ctx: &PolicyContext<'_>,
        ) -> (ReplicaCounts, ActivityCounts) {
            let doubled = replicas.into_iter().map(|(k, v)| (k, v * 2)).collect();
            (doubled, activity)
        }
    }

    #[test]
    fn test_standard_stage_order() {
        let policy = ScalingPolicy::standard(&ControllerConfig::default());
        assert_eq!(policy.stage_names(), vec!["base", "smoother", "delayer"]);
    }

    #[test]
    fn test_stages_applied_in_order() {
        let functions = HashMap::new();
        let mut topics = HashMap::new();
        let input = TopicKey::new("input").unwrap();
        topics.insert(input.clone(), Topic::new(input.clone(), Some(10)));
        let actual = HashMap::new();
        let ctx = PolicyContext {
            functions: &functions,
            topics: &topics,
            actual_replicas: &actual,
            now: Instant::now(),
        };

        let fn_key = FunctionKey::new("fn").unwrap();
        let mut snapshot = LagSnapshot::new();
        snapshot.insert(
            Subscription::new(input, fn_key.clone()),
            PartitionedOffsets::from_lags(&[1]),
        );

        let mut policy = ScalingPolicy::new(BasePolicy::new(1, 10)).with_stage(Doubler);
        assert_eq!(policy.stage_names(), vec!["base", "doubler"]);
        assert_eq!(policy.propose(&snapshot, &ctx)[&fn_key], 2);
    }
}
