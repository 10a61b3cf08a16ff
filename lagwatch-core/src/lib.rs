// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lagwatch Core Library
//!
//! Reactive autoscaling controller for message-driven functions. Replica
//! counts follow the consumer lag of each function's input topic, through a
//! base policy, an exponential smoother and a scale-down delayer.

pub mod config;
pub mod controller;
pub mod deployer;
pub mod error;
pub mod feed;
pub mod memory;
pub mod metrics;
pub mod offsets;
pub mod policy;
pub mod tracker;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, ControllerConfig};
pub use controller::{Controller, ControllerSnapshot};
pub use deployer::{Deployer, DryRunDeployer};
pub use error::{
    BackendError, DeployerError, HardValidationError, LagwatchError, LagwatchResult,
};
pub use feed::{ChangeFeed, Event, EventSender, ResourceEvent, StaticFeed};
pub use memory::InMemoryBroker;
pub use offsets::{LagSnapshot, Offsets, PartitionedOffsets};
pub use policy::{
    Activity, ActivityCounts, BasePolicy, Delayer, PolicyContext, ReplicaCounts, ScalingPolicy,
    ScalingStage, Smoother,
};
pub use tracker::{BackendLagTracker, GroupOffsets, LagTracker, OffsetBackend};
pub use types::{DeploymentStatus, Function, FunctionKey, Subscription, Topic, TopicKey};
