// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Consumer lag tracking.
//!
//! The [`LagTracker`] is what the controller talks to. [`BackendLagTracker`]
//! implements it on top of the narrow [`OffsetBackend`] interface, which is
//! the only place a messaging system (Kafka in production, the in-memory
//! broker in tests and simulations) has to be plugged in.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BackendError;
use crate::offsets::{LagSnapshot, Offsets, PartitionedOffsets, UNKNOWN_OFFSET};
use crate::types::{FunctionKey, Subscription, TopicKey};

/// Computes how many unprocessed messages each function has to take care of.
pub trait LagTracker {
    /// Register a subscription for tracking.
    fn begin_tracking(&mut self, subscription: Subscription) -> Result<(), BackendError>;

    /// Unregister a subscription. Unknown subscriptions are ignored.
    fn stop_tracking(&mut self, subscription: &Subscription) -> Result<(), BackendError>;

    /// Measure all tracked subscriptions.
    fn compute(&mut self) -> LagSnapshot;
}

/// Read access to a messaging backend's log positions.
pub trait OffsetBackend {
    /// Partition indices of a topic.
    fn partitions(&self, topic: &TopicKey) -> Result<Vec<i32>, BackendError>;

    /// Position the next produced message will get on a partition.
    fn newest_offset(&self, topic: &TopicKey, partition: i32) -> Result<i64, BackendError>;

    /// Acquire the committed positions of a consumer group. The handle holds
    /// backend-side resources and releases them when dropped.
    fn open_group(&self, group: &FunctionKey)
        -> Result<Box<dyn GroupOffsets + '_>, BackendError>;
}

/// Scoped handle on a consumer group's committed positions.
pub trait GroupOffsets {
    /// Next offset the group will consume, `None` if it never committed.
    fn next_offset(&mut self, topic: &TopicKey, partition: i32)
        -> Result<Option<i64>, BackendError>;
}

impl<B: OffsetBackend + ?Sized> OffsetBackend for Arc<B> {
    fn partitions(&self, topic: &TopicKey) -> Result<Vec<i32>, BackendError> {
        (**self).partitions(topic)
    }

    fn newest_offset(&self, topic: &TopicKey, partition: i32) -> Result<i64, BackendError> {
        (**self).newest_offset(topic, partition)
    }

    fn open_group(
        &self,
        group: &FunctionKey,
    ) -> Result<Box<dyn GroupOffsets + '_>, BackendError> {
        (**self).open_group(group)
    }
}

/// [`LagTracker`] reading positions from an [`OffsetBackend`].
pub struct BackendLagTracker<B> {
    backend: B,
    subscriptions: HashMap<Subscription, PartitionedOffsets>,
}

impl<B: OffsetBackend> BackendLagTracker<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            subscriptions: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether a subscription is currently tracked.
    pub fn is_tracking(&self, subscription: &Subscription) -> bool {
        self.subscriptions.contains_key(subscription)
    }

    fn offsets_for(&self, subscription: &Subscription) -> PartitionedOffsets {
        let previous = self
            .subscriptions
            .get(subscription)
            .cloned()
            .unwrap_or_default();

        let partitions = match self.backend.partitions(&subscription.topic) {
            Ok(partitions) => partitions,
            Err(e) => {
                tracing::warn!(
                    subscription = %subscription,
                    error = %e,
                    "Failed to read partitions, reusing known partition set"
                );
                previous.partitions().collect()
            }
        };

        let mut group = match self.backend.open_group(&subscription.group) {
            Ok(group) => group,
            Err(e) => {
                tracing::warn!(
                    subscription = %subscription,
                    error = %e,
                    "Failed to read consumer group positions"
                );
                return previous;
            }
        };

        let mut fresh = PartitionedOffsets::new();
        for partition in partitions {
            let measured = self
                .backend
                .newest_offset(&subscription.topic, partition)
                .and_then(|end| {
                    group
                        .next_offset(&subscription.topic, partition)
                        .map(|next| (next.unwrap_or(0), end))
                });

            match measured {
                Ok((current, end)) => {
                    let previous_current = previous
                        .get(partition)
                        .map(|o| o.current)
                        .unwrap_or(UNKNOWN_OFFSET);
                    fresh.insert(
                        partition,
                        Offsets {
                            current,
                            end,
                            previous_current,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        subscription = %subscription,
                        partition,
                        error = %e,
                        "Skipping unreachable partition"
                    );
                    if let Some(last) = previous.get(partition) {
                        fresh.insert(partition, *last);
                    }
                }
            }
        }
        fresh
    }
}

impl<B: OffsetBackend> LagTracker for BackendLagTracker<B> {
    fn begin_tracking(&mut self, subscription: Subscription) -> Result<(), BackendError> {
        // Registered before discovery so a failed lookup is retried on the next compute.
        let offsets = self
            .subscriptions
            .entry(subscription.clone())
            .or_default();

        let partitions = self.backend.partitions(&subscription.topic).map_err(|e| {
            BackendError::BackendUnavailable {
                topic: subscription.topic.clone(),
                reason: e.to_string(),
            }
        })?;

        for partition in partitions {
            offsets.insert(partition, Offsets::unknown());
        }

        tracing::debug!(subscription = %subscription, "Tracking subscription");
        Ok(())
    }

    fn stop_tracking(&mut self, subscription: &Subscription) -> Result<(), BackendError> {
        if self.subscriptions.remove(subscription).is_some() {
            tracing::debug!(subscription = %subscription, "Stopped tracking subscription");
        }
        Ok(())
    }

    fn compute(&mut self) -> LagSnapshot {
        let tracked: Vec<Subscription> = self.subscriptions.keys().cloned().collect();
        for subscription in tracked {
            let fresh = self.offsets_for(&subscription);
            self.subscriptions.insert(subscription, fresh);
        }
        self.subscriptions.clone()
    }
}
