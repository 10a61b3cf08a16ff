// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Stepped autoscaling simulation.
//!
//! A scripted producer writes to an in-memory topic, consumers drain it at a
//! fixed rate per replica, and the scaling pipeline is driven against a
//! virtual clock advancing one scaling interval per step. Replicas take a
//! while to become ready, removals are immediate.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use lagwatch_core::{
    BackendError, BackendLagTracker, ControllerConfig, Function, FunctionKey, HardValidationError,
    InMemoryBroker, LagTracker, PolicyContext, ScalingPolicy, Topic, TopicKey,
};

/// Upper bound on producer writes per step.
pub const MAX_WRITES_PER_STEP: u64 = 40;
/// Messages one replica consumes per step.
pub const READS_PER_REPLICA: u64 = 10;
/// Steps before a newly requested replica counts as running.
pub const REPLICA_STARTUP_STEPS: u64 = 15;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid simulation resource: {0}")]
    Validation(#[from] HardValidationError),

    #[error("Simulated broker failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to write simulation output: {0}")]
    Io(#[from] std::io::Error),
}

/// Producer writes for a given step: quiet, step up, further up, step down,
/// quiet, sinusoid, quiet, ramp up, ramp down, quiet.
pub fn writes_for(step: u64) -> u64 {
    let max = MAX_WRITES_PER_STEP;
    match step {
        0..=99 => 0,
        100..=999 => max / 2,
        1000..=1999 => max,
        2000..=2999 => max / 2,
        3000..=3999 => 0,
        4000..=5999 => {
            // Phase advances in whole units every 167 steps.
            let phase = ((step - 4000) / 167) as f64;
            let swing = (max as f64 * phase.sin() / 2.0) as i64;
            (max as i64 / 2 + swing).max(0) as u64
        }
        6000..=6999 => 0,
        7000..=7999 => max * (step - 7000) / 1000,
        8000..=8999 => max * (9000 - step) / 1000,
        _ => 0,
    }
}

/// Replicas that start after a delay and stop immediately.
#[derive(Debug, Default)]
pub struct ReplicaModel {
    now: u64,
    actual: u32,
    last_desired: u32,
    /// Step at which each pending replica becomes ready.
    scheduled: Vec<u64>,
}

impl ReplicaModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn desire(&mut self, desired: u32) {
        if desired > self.last_desired {
            let ready_at = self.now + REPLICA_STARTUP_STEPS;
            self.scheduled
                .extend(std::iter::repeat(ready_at).take((desired - self.last_desired) as usize));
        } else if desired < self.last_desired {
            let mut remove = (self.last_desired - desired) as usize;
            let pending = remove.min(self.scheduled.len());
            self.scheduled.truncate(self.scheduled.len() - pending);
            remove -= pending;
            self.actual = self.actual.saturating_sub(remove as u32);
        }
        self.last_desired = desired;
    }

    pub fn tick(&mut self) {
        self.now += 1;
        let now = self.now;
        let before = self.scheduled.len();
        self.scheduled.retain(|&ready_at| ready_at > now);
        self.actual += (before - self.scheduled.len()) as u32;
    }

    pub fn actual(&self) -> u32 {
        self.actual
    }
}

/// One line of simulation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationStep {
    pub step: u64,
    pub actual_replicas: u32,
    pub lag: i64,
    pub writes: u64,
}

/// Run `steps` steps of the simulation against a topic with `partitions`
/// partitions, calling `record` after each one.
pub fn simulate(
    config: &ControllerConfig,
    steps: u64,
    partitions: u32,
    mut record: impl FnMut(&SimulationStep) -> Result<(), SimulationError>,
) -> Result<(), SimulationError> {
    let topic_key = TopicKey::new("topic")?;
    let function_key = FunctionKey::new("stub-function")?;

    let broker = Arc::new(InMemoryBroker::new());
    broker.create_topic(&topic_key, partitions);

    let function = Function::new(function_key.clone(), topic_key.clone())
        .with_defaults(config.default_idle_timeout);
    let mut tracker = BackendLagTracker::new(Arc::clone(&broker));
    tracker.begin_tracking(function.subscription())?;

    let functions = HashMap::from([(function_key.clone(), function)]);
    let topics = HashMap::from([(
        topic_key.clone(),
        Topic::new(topic_key.clone(), Some(partitions)),
    )]);
    let mut policy = ScalingPolicy::standard(config);
    let mut model = ReplicaModel::new();
    let start = Instant::now();

    for step in 0..steps {
        let writes = writes_for(step);
        broker.produce_spread(&topic_key, writes)?;
        broker.consume(
            &function_key,
            &topic_key,
            READS_PER_REPLICA * u64::from(model.actual()),
        );

        let snapshot = tracker.compute();
        let actual_replicas = HashMap::from([(function_key.clone(), model.actual())]);
        let ctx = PolicyContext {
            functions: &functions,
            topics: &topics,
            actual_replicas: &actual_replicas,
            now: start + config.scaling_interval * step as u32,
        };
        let desired = policy
            .propose(&snapshot, &ctx)
            .get(&function_key)
            .copied()
            .unwrap_or(0);

        model.desire(desired);
        model.tick();

        record(&SimulationStep {
            step,
            actual_replicas: model.actual(),
            lag: broker.total_lag(&function_key, &topic_key),
            writes,
        })?;
    }
    Ok(())
}

/// Run the simulation writing `step actual_replicas lag writes` lines.
pub fn simulate_to(
    config: &ControllerConfig,
    steps: u64,
    partitions: u32,
    mut out: impl Write,
) -> Result<(), SimulationError> {
    simulate(config, steps, partitions, |s| {
        writeln!(out, "{} {} {} {}", s.step, s.actual_replicas, s.lag, s.writes)?;
        Ok(())
    })?;
    out.flush()?;
    Ok(())
}
