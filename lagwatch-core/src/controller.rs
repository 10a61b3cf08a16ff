// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The scaling controller.
//!
//! A single task owns all controller state and reacts to two things: events
//! arriving on its queue and a periodic scaling tick. Nothing else touches
//! the function, topic or replica maps, so no locking is needed.
//!
//! On every tick the tracked lag is measured, run through the
//! [`ScalingPolicy`], and each function whose proposed replica count differs
//! from the last known one is scaled. Deployment status events from the
//! platform overwrite the known counts, which is how drift gets corrected.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::config::ControllerConfig;
use crate::deployer::Deployer;
use crate::error::{HardValidationError, LagwatchResult};
use crate::feed::{ChangeFeed, Event, EventSender, ResourceEvent};
use crate::metrics;
use crate::policy::{BasePolicy, PolicyContext, ScalingPolicy};
use crate::tracker::LagTracker;
use crate::types::{DeploymentStatus, Function, FunctionKey, Topic, TopicKey};

/// Point-in-time copy of the controller state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    pub functions: BTreeMap<FunctionKey, Function>,
    pub topics: BTreeMap<TopicKey, Topic>,
    pub actual_replicas: BTreeMap<FunctionKey, u32>,
}

pub struct Controller<T, D> {
    config: ControllerConfig,
    tracker: T,
    deployer: D,
    policy: ScalingPolicy,
    functions: HashMap<FunctionKey, Function>,
    topics: HashMap<TopicKey, Topic>,
    actual_replicas: HashMap<FunctionKey, u32>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    feeds: Vec<Box<dyn ChangeFeed>>,
}

impl<T: LagTracker, D: Deployer> Controller<T, D> {
    /// Create a controller scaling with the base policy alone.
    pub fn new(config: ControllerConfig, tracker: T, deployer: D) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            policy: ScalingPolicy::new(BasePolicy::from_config(&config)),
            config,
            tracker,
            deployer,
            functions: HashMap::new(),
            topics: HashMap::new(),
            actual_replicas: HashMap::new(),
            events_tx,
            events_rx,
            feeds: Vec::new(),
        }
    }

    /// Handle for pushing events onto the controller queue.
    pub fn event_sender(&self) -> EventSender {
        EventSender::new(self.events_tx.clone())
    }

    /// Register a feed to be started with the loop.
    pub fn add_feed(&mut self, feed: impl ChangeFeed + 'static) {
        self.feeds.push(Box::new(feed));
    }

    /// Change the tick period. Takes effect the next time [`run`](Self::run) starts.
    pub fn set_scaling_interval(&mut self, interval: Duration) -> LagwatchResult<()> {
        if interval.is_zero() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "scaling_interval",
                value: format!("{:?}", interval),
                reason: "Scaling interval must be greater than 0".to_string(),
            }
            .into());
        }
        self.config.scaling_interval = interval;
        Ok(())
    }

    pub fn set_scaling_policy(&mut self, policy: ScalingPolicy) {
        tracing::debug!(stages = ?policy.stage_names(), "Scaling policy replaced");
        self.policy = policy;
    }

    pub fn scaling_interval(&self) -> Duration {
        self.config.scaling_interval
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn deployer(&self) -> &D {
        &self.deployer
    }

    pub fn deployer_mut(&mut self) -> &mut D {
        &mut self.deployer
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            functions: self
                .functions
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            topics: self
                .topics
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            actual_replicas: self
                .actual_replicas
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Run the event loop until `shutdown` turns true or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_ms = self.config.scaling_interval.as_millis() as u64,
            stages = ?self.policy.stage_names(),
            "Controller starting"
        );

        let sender = self.event_sender();
        for feed in &mut self.feeds {
            tracing::debug!(feed = feed.name(), "Starting feed");
            feed.start(sender.clone());
        }
        drop(sender);

        let period = self.config.scaling_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    Some(event) = self.events_rx.recv() => self.handle_event(event),
                    _ = ticker.tick() => self.tick(),
                }
            }
        }

        for feed in &mut self.feeds {
            feed.stop();
        }
        tracing::info!("Controller stopped");
    }

    /// Apply one event to the controller state.
    pub fn handle_event(&mut self, event: Event) {
        tracing::debug!(event = ?event, "Handling event");
        match event {
            Event::Function(ResourceEvent::Added(function)) => self.function_added(function),
            Event::Function(ResourceEvent::Updated(function)) => self.function_updated(function),
            Event::Function(ResourceEvent::Deleted(function)) => self.function_deleted(function),
            Event::Topic(ResourceEvent::Added(topic) | ResourceEvent::Updated(topic)) => {
                let topic = topic.with_defaults();
                self.topics.insert(topic.name.clone(), topic);
            }
            Event::Topic(ResourceEvent::Deleted(topic)) => {
                self.topics.remove(&topic.name);
            }
            Event::Deployment(event) => self.deployment_changed(event),
        }
    }

    /// Scaling tick at the current time.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Scaling tick with an explicit notion of "now".
    pub fn tick_at(&mut self, now: Instant) {
        metrics::TICKS.inc();

        let snapshot = self.tracker.compute();
        let ctx = PolicyContext {
            functions: &self.functions,
            topics: &self.topics,
            actual_replicas: &self.actual_replicas,
            now,
        };
        let desired = self.policy.propose(&snapshot, &ctx);

        let changes: Vec<(FunctionKey, u32, u32)> = self
            .functions
            .keys()
            .filter_map(|key| {
                // No measurement for this function yet: leave it alone.
                let wanted = desired.get(key).copied()?;
                let actual = self.actual_replicas.get(key).copied().unwrap_or(0);
                (wanted != actual).then(|| (key.clone(), actual, wanted))
            })
            .collect();

        for (key, actual, wanted) in changes {
            let Some(function) = self.functions.get(&key) else {
                continue;
            };
            tracing::info!(function = %key, from = actual, to = wanted, "Scaling function");
            match self.deployer.scale(function, wanted) {
                Ok(()) => {
                    metrics::record_scale(&key, wanted);
                    self.actual_replicas.insert(key, wanted);
                }
                Err(e) => {
                    tracing::warn!(function = %key, error = %e, "Scale failed, will retry");
                    metrics::record_deployer_error(&key, "scale");
                }
            }
        }
    }

    /// Store a function and make sure its current input is tracked.
    fn upsert_function(&mut self, function: Function) -> Function {
        let function = function.with_defaults(self.config.default_idle_timeout);
        let previous = self.functions.insert(function.name.clone(), function.clone());

        match previous {
            Some(old) if old.input == function.input => {}
            Some(old) => {
                tracing::info!(
                    function = %function.name,
                    from = %old.input,
                    to = %function.input,
                    "Function input changed"
                );
                self.stop_tracking(&old);
                metrics::forget_input(&function.name, &old.input);
                self.begin_tracking(&function);
            }
            None => self.begin_tracking(&function),
        }
        function
    }

    fn function_added(&mut self, function: Function) {
        let function = self.upsert_function(function);
        tracing::info!(function = %function.name, input = %function.input, "Function added");
        if let Err(e) = self.deployer.deploy(&function) {
            tracing::error!(function = %function.name, error = %e, "Deploy failed");
            metrics::record_deployer_error(&function.name, "deploy");
        }
    }

    fn function_updated(&mut self, function: Function) {
        let function = self.upsert_function(function);
        let replicas = self.actual_replicas.get(&function.name).copied().unwrap_or(0);
        tracing::info!(function = %function.name, replicas, "Function updated");
        if let Err(e) = self.deployer.update(&function, replicas) {
            tracing::error!(function = %function.name, error = %e, "Update failed");
            metrics::record_deployer_error(&function.name, "update");
        }
    }

    fn function_deleted(&mut self, function: Function) {
        let function = self.functions.remove(&function.name).unwrap_or(function);
        self.actual_replicas.remove(&function.name);
        self.stop_tracking(&function);
        tracing::info!(function = %function.name, "Function deleted");
        if let Err(e) = self.deployer.undeploy(&function) {
            tracing::error!(function = %function.name, error = %e, "Undeploy failed");
            metrics::record_deployer_error(&function.name, "undeploy");
        }
        metrics::forget_function(&function.name, &function.input);
    }

    fn deployment_changed(&mut self, event: ResourceEvent<DeploymentStatus>) {
        let Some(key) = event.resource().function_key() else {
            tracing::trace!(deployment = %event.resource().name, "Ignoring unlabelled deployment");
            return;
        };
        match event {
            ResourceEvent::Added(status) | ResourceEvent::Updated(status) => {
                if !self.functions.contains_key(&key) {
                    tracing::debug!(function = %key, "Ignoring status of unknown function");
                    return;
                }
                tracing::debug!(function = %key, replicas = status.replicas, "Observed replicas");
                self.actual_replicas.insert(key, status.replicas);
            }
            ResourceEvent::Deleted(_) => {
                self.actual_replicas.remove(&key);
            }
        }
    }

    fn begin_tracking(&mut self, function: &Function) {
        if let Err(e) = self.tracker.begin_tracking(function.subscription()) {
            tracing::warn!(function = %function.name, error = %e, "Could not start tracking input");
        }
    }

    fn stop_tracking(&mut self, function: &Function) {
        if let Err(e) = self.tracker.stop_tracking(&function.subscription()) {
            tracing::warn!(function = %function.name, error = %e, "Could not stop tracking input");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::deployer::DryRunDeployer;
    use crate::memory::InMemoryBroker;
    use crate::tracker::BackendLagTracker;

    type TestController = Controller<BackendLagTracker<Arc<InMemoryBroker>>, DryRunDeployer>;

    fn controller() -> (TestController, Arc<InMemoryBroker>) {
        let broker = Arc::new(InMemoryBroker::new());
        let tracker = BackendLagTracker::new(Arc::clone(&broker));
        let controller = Controller::new(ControllerConfig::default(), tracker, DryRunDeployer::new());
        (controller, broker)
    }

    fn function(name: &str, input: &str) -> Function {
        Function::new(FunctionKey::new(name).unwrap(), TopicKey::new(input).unwrap())
    }

    #[test]
    fn test_added_function_is_tracked_and_deployed() {
        let (mut c, broker) = controller();
        broker.create_topic(&TopicKey::new("in").unwrap(), 1);

        let f = function("fn", "in");
        c.handle_event(ResourceEvent::Added(f.clone()).into());

        assert!(c.tracker().is_tracking(&f.subscription()));
        assert_eq!(c.deployer().replicas().get(&f.name), Some(&0));
        let stored = &c.snapshot().functions[&f.name];
        assert_eq!(stored.idle_timeout(), Some(ControllerConfig::default().default_idle_timeout));
    }

    #[test]
    fn test_input_change_moves_tracking() {
        let (mut c, _broker) = controller();
        let old = function("fn", "a");
        let new = function("fn", "b");
        c.handle_event(ResourceEvent::Added(old.clone()).into());
        c.handle_event(ResourceEvent::Updated(new.clone()).into());

        assert!(!c.tracker().is_tracking(&old.subscription()));
        assert!(c.tracker().is_tracking(&new.subscription()));
    }

    #[test]
    fn test_deleted_function_forgotten() {
        let (mut c, _broker) = controller();
        let f = function("fn", "in");
        c.handle_event(ResourceEvent::Added(f.clone()).into());
        c.handle_event(ResourceEvent::Added(DeploymentStatus::for_function(&f.name, 2)).into());
        c.handle_event(ResourceEvent::Deleted(f.clone()).into());

        let snapshot = c.snapshot();
        assert!(snapshot.functions.is_empty());
        assert!(snapshot.actual_replicas.is_empty());
        assert!(!c.tracker().is_tracking(&f.subscription()));
        assert!(c.deployer().replicas().is_empty());
    }

    #[test]
    fn test_late_status_for_deleted_function_ignored() {
        let (mut c, _broker) = controller();
        let f = function("fn", "in");
        c.handle_event(ResourceEvent::Added(f.clone()).into());
        c.handle_event(ResourceEvent::Deleted(f.clone()).into());
        c.handle_event(ResourceEvent::Updated(DeploymentStatus::for_function(&f.name, 3)).into());

        assert!(c.snapshot().actual_replicas.is_empty());
    }

    #[test]
    fn test_unlabelled_deployment_ignored() {
        let (mut c, _broker) = controller();
        let status = DeploymentStatus {
            name: "unrelated".to_string(),
            labels: BTreeMap::new(),
            replicas: 4,
        };
        c.handle_event(ResourceEvent::Added(status).into());
        assert!(c.snapshot().actual_replicas.is_empty());
    }

    #[test]
    fn test_topic_defaults_applied() {
        let (mut c, _broker) = controller();
        let topic = Topic::new(TopicKey::new("in").unwrap(), None);
        c.handle_event(ResourceEvent::Added(topic.clone()).into());
        assert_eq!(c.snapshot().topics[&topic.name].partitions, Some(1));

        c.handle_event(ResourceEvent::Deleted(topic).into());
        assert!(c.snapshot().topics.is_empty());
    }

    #[test]
    fn test_tick_scales_on_lag() {
        let (mut c, broker) = controller();
        let input = TopicKey::new("in").unwrap();
        broker.create_topic(&input, 3);
        c.handle_event(ResourceEvent::Added(Topic::new(input.clone(), Some(3))).into());
        let f = function("fn", "in");
        c.handle_event(ResourceEvent::Added(f.clone()).into());

        broker.produce(&input, 1, 10).unwrap();
        c.tick();
        assert_eq!(c.snapshot().actual_replicas[&f.name], 3);
        assert_eq!(c.deployer().replicas()[&f.name], 3);
    }

    #[test]
    fn test_failed_scale_retried_next_tick() {
        let (mut c, broker) = controller();
        let input = TopicKey::new("in").unwrap();
        broker.create_topic(&input, 1);
        let f = function("fn", "in");

        // Tracked but never deployed: the dry-run deployer rejects the scale.
        c.upsert_function(f.clone());
        broker.produce(&input, 0, 1).unwrap();
        c.tick();
        assert!(c.snapshot().actual_replicas.get(&f.name).is_none());

        c.deployer.deploy(&f).unwrap();
        c.tick();
        assert_eq!(c.snapshot().actual_replicas[&f.name], 1);
    }

    #[test]
    fn test_snapshot_serializes_by_name() {
        let (mut c, _broker) = controller();
        let f = function("fn", "in");
        c.handle_event(ResourceEvent::Added(f.clone()).into());
        c.handle_event(ResourceEvent::Added(DeploymentStatus::for_function(&f.name, 2)).into());

        let json = serde_json::to_value(c.snapshot()).unwrap();
        assert_eq!(json["actual_replicas"]["fn"], 2);
        assert_eq!(json["functions"]["fn"]["input"], "in");
    }

    #[test]
    fn test_zero_scaling_interval_rejected() {
        let (mut c, _broker) = controller();
        let before = c.scaling_interval();

        let err = c.set_scaling_interval(Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("scaling_interval"));
        assert_eq!(c.scaling_interval(), before);

        c.set_scaling_interval(Duration::from_millis(250)).unwrap();
        assert_eq!(c.scaling_interval(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (mut c, _broker) = controller();
        c.set_scaling_interval(Duration::from_millis(5)).unwrap();
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.send(true).unwrap();
        });

        tokio::time::timeout(Duration::from_secs(5), c.run(rx))
            .await
            .expect("controller did not stop");
        stopper.await.unwrap();
    }
}
