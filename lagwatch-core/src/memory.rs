// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Thread-safe in-memory broker using DashMap.
//!
//! Stands in for the messaging backend when running locally or under test:
//! producers and consumers may run on any thread while the lag tracker reads
//! positions through [`OffsetBackend`].

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};

use crate::error::BackendError;
use crate::tracker::{GroupOffsets, OffsetBackend};
use crate::types::{FunctionKey, TopicKey};

/// In-memory partitioned log positions.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    /// Partition count per topic.
    topics: DashMap<TopicKey, u32>,
    /// End position per (topic, partition).
    ends: DashMap<(TopicKey, i32), i64>,
    /// Committed position per (group, topic, partition).
    commits: DashMap<(FunctionKey, TopicKey, i32), i64>,
    /// Partitions whose queries fail.
    failing: DashSet<(TopicKey, i32)>,
    /// Group handles currently held by readers.
    open_handles: AtomicUsize,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topic, or grow an existing one to `partitions`.
    pub fn create_topic(&self, topic: &TopicKey, partitions: u32) {
        let mut count = self.topics.entry(topic.clone()).or_insert(0);
        for partition in *count..partitions {
            self.ends.entry((topic.clone(), partition as i32)).or_insert(0);
        }
        *count = (*count).max(partitions);
    }

    pub fn partition_count(&self, topic: &TopicKey) -> Option<u32> {
        self.topics.get(topic).map(|c| *c)
    }

    /// Append `count` messages to a partition, returning the new end position.
    pub fn produce(&self, topic: &TopicKey, partition: i32, count: u64) -> Result<i64, BackendError> {
        let mut end = self
            .ends
            .get_mut(&(topic.clone(), partition))
            .ok_or_else(|| BackendError::PartitionUnavailable {
                topic: topic.clone(),
                partition,
                reason: "no such partition".to_string(),
            })?;
        *end += count as i64;
        Ok(*end)
    }

    /// Append `count` messages spread evenly over all partitions of a topic.
    pub fn produce_spread(&self, topic: &TopicKey, count: u64) -> Result<(), BackendError> {
        let partitions = self
            .partition_count(topic)
            .ok_or_else(|| BackendError::UnknownTopic {
                topic: topic.clone(),
            })? as u64;
        for partition in 0..partitions {
            let share = count / partitions + u64::from(partition < count % partitions);
            if share > 0 {
                self.produce(topic, partition as i32, share)?;
            }
        }
        Ok(())
    }

    /// Set a consumer group's committed position on a partition.
    pub fn commit(&self, group: &FunctionKey, topic: &TopicKey, partition: i32, position: i64) {
        self.commits
            .insert((group.clone(), topic.clone(), partition), position);
    }

    /// Advance a group over at most `max` unconsumed messages of a topic,
    /// partition by partition. Returns how many were consumed.
    pub fn consume(&self, group: &FunctionKey, topic: &TopicKey, max: u64) -> u64 {
        let partitions = self.partition_count(topic).unwrap_or(0);
        let mut remaining = max as i64;
        for partition in 0..partitions as i32 {
            if remaining == 0 {
                break;
            }
            let end = self
                .ends
                .get(&(topic.clone(), partition))
                .map(|e| *e)
                .unwrap_or(0);
            let mut committed = self
                .commits
                .entry((group.clone(), topic.clone(), partition))
                .or_insert(0);
            let taken = (end - *committed).clamp(0, remaining);
            *committed += taken;
            remaining -= taken;
        }
        max - remaining as u64
    }

    /// Total unconsumed messages of a topic for a group.
    pub fn total_lag(&self, group: &FunctionKey, topic: &TopicKey) -> i64 {
        let partitions = self.partition_count(topic).unwrap_or(0);
        (0..partitions as i32)
            .map(|partition| {
                let end = self
                    .ends
                    .get(&(topic.clone(), partition))
                    .map(|e| *e)
                    .unwrap_or(0);
                let committed = self
                    .commits
                    .get(&(group.clone(), topic.clone(), partition))
                    .map(|c| *c)
                    .unwrap_or(0);
                (end - committed).max(0)
            })
            .sum()
    }

    /// Make every query touching this partition fail.
    pub fn fail_partition(&self, topic: &TopicKey, partition: i32) {
        self.failing.insert((topic.clone(), partition));
    }

    pub fn heal_partition(&self, topic: &TopicKey, partition: i32) {
        self.failing.remove(&(topic.clone(), partition));
    }

    /// Number of group handles not yet released.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    fn check_partition(&self, topic: &TopicKey, partition: i32) -> Result<(), BackendError> {
        if self.failing.contains(&(topic.clone(), partition)) {
            return Err(BackendError::PartitionUnavailable {
                topic: topic.clone(),
                partition,
                reason: "partition leader not available".to_string(),
            });
        }
        Ok(())
    }
}

impl OffsetBackend for InMemoryBroker {
    fn partitions(&self, topic: &TopicKey) -> Result<Vec<i32>, BackendError> {
        self.partition_count(topic)
            .map(|count| (0..count as i32).collect())
            .ok_or_else(|| BackendError::UnknownTopic {
                topic: topic.clone(),
            })
    }

    fn newest_offset(&self, topic: &TopicKey, partition: i32) -> Result<i64, BackendError> {
        self.check_partition(topic, partition)?;
        self.ends
            .get(&(topic.clone(), partition))
            .map(|e| *e)
            .ok_or_else(|| BackendError::PartitionUnavailable {
                topic: topic.clone(),
                partition,
                reason: "no such partition".to_string(),
            })
    }

    fn open_group(
        &self,
        group: &FunctionKey,
    ) -> Result<Box<dyn GroupOffsets + '_>, BackendError> {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryGroupOffsets {
            broker: self,
            group: group.clone(),
        }))
    }
}

struct MemoryGroupOffsets<'a> {
    broker: &'a InMemoryBroker,
    group: FunctionKey,
}

impl GroupOffsets for MemoryGroupOffsets<'_> {
    fn next_offset(
        &mut self,
        topic: &TopicKey,
        partition: i32,
    ) -> Result<Option<i64>, BackendError> {
        self.broker.check_partition(topic, partition)?;
        Ok(self
            .broker
            .commits
            .get(&(self.group.clone(), topic.clone(), partition))
            .map(|c| *c))
    }
}

impl Drop for MemoryGroupOffsets<'_> {
    fn drop(&mut self) {
        self.broker.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn topic() -> TopicKey {
        TopicKey::new("input").unwrap()
    }

    #[test]
    fn test_produce_and_consume() {
        let broker = InMemoryBroker::new();
        let group = FunctionKey::new("fn").unwrap();
        broker.create_topic(&topic(), 2);

        broker.produce(&topic(), 0, 3).unwrap();
        broker.produce(&topic(), 1, 4).unwrap();
        assert_eq!(broker.total_lag(&group, &topic()), 7);

        assert_eq!(broker.consume(&group, &topic(), 5), 5);
        assert_eq!(broker.total_lag(&group, &topic()), 2);
        assert_eq!(broker.consume(&group, &topic(), 10), 2);
        assert_eq!(broker.total_lag(&group, &topic()), 0);
    }

    #[test]
    fn test_produce_spread() {
        let broker = InMemoryBroker::new();
        broker.create_topic(&topic(), 3);
        broker.produce_spread(&topic(), 7).unwrap();
        assert_eq!(broker.newest_offset(&topic(), 0).unwrap(), 3);
        assert_eq!(broker.newest_offset(&topic(), 1).unwrap(), 2);
        assert_eq!(broker.newest_offset(&topic(), 2).unwrap(), 2);
    }

    #[test]
    fn test_unknown_topic() {
        let broker = InMemoryBroker::new();
        assert!(matches!(
            broker.partitions(&topic()),
            Err(BackendError::UnknownTopic { .. })
        ));
        assert!(broker.produce(&topic(), 0, 1).is_err());
    }

    #[test]
    fn test_failing_partition() {
        let broker = InMemoryBroker::new();
        broker.create_topic(&topic(), 1);
        broker.fail_partition(&topic(), 0);
        assert!(broker.newest_offset(&topic(), 0).is_err());
        broker.heal_partition(&topic(), 0);
        assert!(broker.newest_offset(&topic(), 0).is_ok());
    }

    #[test]
    fn test_group_handle_released_on_drop() {
        let broker = InMemoryBroker::new();
        let group = FunctionKey::new("fn").unwrap();
        {
            let _handle = broker.open_group(&group).unwrap();
            assert_eq!(broker.open_handles(), 1);
        }
        assert_eq!(broker.open_handles(), 0);
    }

    #[test]
    fn test_concurrent_producers() {
        use std::thread;

        let broker = Arc::new(InMemoryBroker::new());
        broker.create_topic(&topic(), 4);

        let handles: Vec<_> = (0..4)
            .map(|p| {
                let b = Arc::clone(&broker);
                thread::spawn(move || {
                    for _ in 0..100 {
                        b.produce(&topic(), p, 1).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let group = FunctionKey::new("fn").unwrap();
        assert_eq!(broker.total_lag(&group, &topic()), 400);
    }
}
