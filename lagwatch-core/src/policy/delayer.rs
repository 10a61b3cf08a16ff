// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Scale-down hysteresis.
//!
//! A decision to go to zero replicas only takes effect once it has held for
//! the function's idle timeout with no new messages arriving. Scale-ups are
//! suppressed while the function's activity marker is unchanged, which stops
//! a stale lag reading from adding replicas nobody is feeding.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::FunctionKey;

use super::{ActivityCounts, PolicyContext, ReplicaCounts, ScalingStage};

#[derive(Debug, Clone)]
pub struct Delayer {
    default_idle_timeout: Duration,
    /// When each pending scale-to-zero decision was first made.
    zero_decisions: HashMap<FunctionKey, Instant>,
    previous_activity: ActivityCounts,
}

impl Delayer {
    pub fn new(default_idle_timeout: Duration) -> Self {
        Self {
            default_idle_timeout,
            zero_decisions: HashMap::new(),
            previous_activity: ActivityCounts::new(),
        }
    }

    /// Whether a scale-to-zero countdown is running for a function.
    pub fn is_pending(&self, function: &FunctionKey) -> bool {
        self.zero_decisions.contains_key(function)
    }

    fn received_messages(&self, function: &FunctionKey, activity: &ActivityCounts) -> bool {
        match (self.previous_activity.get(function), activity.get(function)) {
            (Some(before), Some(now)) => now.end > before.end,
            _ => false,
        }
    }

    fn delay(
        &mut self,
        function: &FunctionKey,
        target: u32,
        activity: &ActivityCounts,
        ctx: &PolicyContext<'_>,
    ) -> u32 {
        let actual = ctx.actual(function);

        if target == 0 && actual > 0 {
            let Some(decided_at) = self.zero_decisions.get(function).copied() else {
                self.zero_decisions.insert(function.clone(), ctx.now);
                tracing::debug!(function = %function, "Scale to zero decided, holding");
                return actual;
            };

            let idle_timeout = ctx
                .idle_timeout(function)
                .unwrap_or(self.default_idle_timeout);
            if ctx.now.saturating_duration_since(decided_at) >= idle_timeout {
                self.zero_decisions.remove(function);
                tracing::debug!(function = %function, "Idle timeout elapsed, scaling to zero");
                return 0;
            }

            if self.received_messages(function, activity) {
                self.zero_decisions.remove(function);
                tracing::debug!(function = %function, "New messages, scale to zero cancelled");
            }
            return actual;
        }

        self.zero_decisions.remove(function);

        let unchanged = self.previous_activity.get(function) == activity.get(function);
        if target > actual && actual > 0 && unchanged {
            tracing::debug!(function = %function, actual, target, "No activity, holding scale-up");
            return actual;
        }

        target
    }
}

impl ScalingStage for Delayer {
    fn name(&self) -> &'static str {
        "delayer"
    }

    fn transform(
        &mut self,
        replicas: ReplicaCounts,
        activity: ActivityCounts,
        ctx: &PolicyContext<'_>,
    ) -> (ReplicaCounts, ActivityCounts) {
        let mut delayed = ReplicaCounts::with_capacity(replicas.len());
        for (function, target) in replicas {
            let value = self.delay(&function, target, &activity, ctx);
            delayed.insert(function, value);
        }

        self.zero_decisions
            .retain(|function, _| delayed.contains_key(function));
        self.previous_activity = activity.clone();
        (delayed, activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Activity;
    use crate::types::{Function, Topic, TopicKey};

    fn key() -> FunctionKey {
        FunctionKey::new("fn").unwrap()
    }

    struct Harness {
        delayer: Delayer,
        functions: HashMap<FunctionKey, Function>,
        topics: HashMap<TopicKey, Topic>,
        start: Instant,
    }

    impl Harness {
        fn new(idle_timeout_ms: u64) -> Self {
            let mut function = Function::new(key(), TopicKey::new("input").unwrap());
            function.idle_timeout_ms = Some(idle_timeout_ms);
            let mut functions = HashMap::new();
            functions.insert(key(), function);
            Self {
                delayer: Delayer::new(Duration::from_secs(10)),
                functions,
                topics: HashMap::new(),
                start: Instant::now(),
            }
        }

        fn step(&mut self, at_ms: u64, target: u32, actual: u32, end: i64) -> u32 {
            let mut actual_replicas = HashMap::new();
            actual_replicas.insert(key(), actual);
            let ctx = PolicyContext {
                functions: &self.functions,
                topics: &self.topics,
                actual_replicas: &actual_replicas,
                now: self.start + Duration::from_millis(at_ms),
            };
            let mut replicas = ReplicaCounts::new();
            replicas.insert(key(), target);
            let mut activity = ActivityCounts::new();
            activity.insert(key(), Activity { current: 0, end });
            let (out, _) = self.delayer.transform(replicas, activity, &ctx);
            out[&key()]
        }
    }

    #[test]
    fn test_scale_to_zero_after_idle_timeout() {
        let mut h = Harness::new(300);
        assert_eq!(h.step(0, 0, 2, 10), 2);
        assert!(h.delayer.is_pending(&key()));
        assert_eq!(h.step(100, 0, 2, 10), 2);
        assert_eq!(h.step(250, 0, 2, 10), 2);
        assert_eq!(h.step(300, 0, 2, 10), 0);
        assert!(!h.delayer.is_pending(&key()));
    }

    #[test]
    fn test_new_messages_restart_countdown() {
        let mut h = Harness::new(300);
        assert_eq!(h.step(0, 0, 1, 10), 1);
        assert_eq!(h.step(200, 0, 1, 11), 1);
        assert!(!h.delayer.is_pending(&key()));

        // Countdown restarts on the next quiet tick.
        assert_eq!(h.step(300, 0, 1, 11), 1);
        assert_eq!(h.step(500, 0, 1, 11), 1);
        assert_eq!(h.step(600, 0, 1, 11), 0);
    }

    #[test]
    fn test_partial_scale_down_is_immediate() {
        let mut h = Harness::new(300);
        assert_eq!(h.step(0, 0, 3, 10), 3);
        assert_eq!(h.step(100, 1, 3, 10), 1);
        assert!(!h.delayer.is_pending(&key()));
    }

    #[test]
    fn test_scale_up_cancels_countdown() {
        let mut h = Harness::new(300);
        assert_eq!(h.step(0, 0, 2, 10), 2);
        assert!(h.delayer.is_pending(&key()));

        assert_eq!(h.step(100, 3, 2, 20), 3);
        assert!(!h.delayer.is_pending(&key()));

        // A later zero decision counts from its own tick.
        assert_eq!(h.step(200, 0, 2, 20), 2);
        assert!(h.delayer.is_pending(&key()));
        assert_eq!(h.step(300, 0, 2, 20), 2);
        assert_eq!(h.step(499, 0, 2, 20), 2);
        assert_eq!(h.step(500, 0, 2, 20), 0);
    }

    #[test]
    fn test_scale_up_held_without_activity() {
        let mut h = Harness::new(300);
        assert_eq!(h.step(0, 1, 1, 10), 1);
        assert_eq!(h.step(100, 3, 1, 10), 1);
        assert_eq!(h.step(200, 3, 1, 20), 3);
    }

    #[test]
    fn test_cold_start_not_held() {
        let mut h = Harness::new(300);
        assert_eq!(h.step(0, 0, 0, 0), 0);
        assert_eq!(h.step(100, 1, 0, 0), 1);
        assert!(!h.delayer.is_pending(&key()));
    }

    #[test]
    fn test_default_idle_timeout_applies() {
        let mut h = Harness::new(300);
        h.functions.clear();
        assert_eq!(h.step(0, 0, 1, 0), 1);
        assert_eq!(h.step(9_000, 0, 1, 0), 1);
        assert_eq!(h.step(10_000, 0, 1, 0), 0);
    }
}
