// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Validates controller settings, scaling calibration and any static
//! function/topic manifests at boot-up time. Any invalid field results in a
//! HardValidationError that prevents startup.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, LagwatchError, LagwatchResult};
use crate::types::{Function, FunctionKey, Topic, TopicKey};

/// Default period between two scaling ticks.
pub const DEFAULT_SCALING_INTERVAL: Duration = Duration::from_millis(100);
/// Default capacity of the controller's event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Lag on a single partition at which one replica is warranted.
pub const DEFAULT_LAG_REQUIRED_FOR_ONE: i64 = 1;
/// Lag on a single partition at which the maximum replica count is warranted.
pub const DEFAULT_LAG_REQUIRED_FOR_MAX: i64 = 10;
/// Fraction of the distance to the target covered by the smoother on each tick.
pub const DEFAULT_SMOOTHER_GREED: f64 = 0.05;
/// Idle time before scaling a function to zero, when the function sets none.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_QUEUE_CAPACITY: usize = 100_000;

/// Raw controller section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawControllerSection {
    #[serde(default = "default_scaling_interval_ms")]
    scaling_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,
    #[serde(default = "default_health_port")]
    health_port: u16,
}

fn default_scaling_interval_ms() -> u64 {
    DEFAULT_SCALING_INTERVAL.as_millis() as u64
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_health_port() -> u16 {
    8080
}

impl Default for RawControllerSection {
    fn default() -> Self {
        Self {
            scaling_interval_ms: default_scaling_interval_ms(),
            queue_capacity: default_queue_capacity(),
            health_port: default_health_port(),
        }
    }
}

/// Raw scaling calibration section.
#[derive(Debug, Deserialize)]
struct RawScalingSection {
    #[serde(default = "default_lag_required_for_one")]
    lag_required_for_one: i64,
    #[serde(default = "default_lag_required_for_max")]
    lag_required_for_max: i64,
    #[serde(default = "default_smoother_greed")]
    smoother_greed: f64,
    #[serde(default = "default_idle_timeout_ms")]
    default_idle_timeout_ms: u64,
}

fn default_lag_required_for_one() -> i64 {
    DEFAULT_LAG_REQUIRED_FOR_ONE
}

fn default_lag_required_for_max() -> i64 {
    DEFAULT_LAG_REQUIRED_FOR_MAX
}

fn default_smoother_greed() -> f64 {
    DEFAULT_SMOOTHER_GREED
}

fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_millis() as u64
}

impl Default for RawScalingSection {
    fn default() -> Self {
        Self {
            lag_required_for_one: default_lag_required_for_one(),
            lag_required_for_max: default_lag_required_for_max(),
            smoother_greed: default_smoother_greed(),
            default_idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    input: Option<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    max_replicas: Option<u32>,
    #[serde(default)]
    idle_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    name: String,
    #[serde(default)]
    partitions: Option<u32>,
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    controller: RawControllerSection,
    #[serde(default)]
    scaling: RawScalingSection,
    #[serde(default)]
    functions: Vec<RawFunction>,
    #[serde(default)]
    topics: Vec<RawTopic>,
}

/// Validated controller configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Period between two scaling ticks.
    pub scaling_interval: Duration,
    /// Capacity of the bounded event queue feeding the controller loop.
    pub queue_capacity: usize,
    /// Port of the health/metrics endpoint, 0 to disable it.
    pub health_port: u16,
    pub lag_required_for_one: i64,
    pub lag_required_for_max: i64,
    pub smoother_greed: f64,
    /// Idle timeout given to functions that do not declare one.
    pub default_idle_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scaling_interval: DEFAULT_SCALING_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            health_port: 0,
            lag_required_for_one: DEFAULT_LAG_REQUIRED_FOR_ONE,
            lag_required_for_max: DEFAULT_LAG_REQUIRED_FOR_MAX,
            smoother_greed: DEFAULT_SMOOTHER_GREED,
            default_idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub controller: ControllerConfig,
    pub functions: Vec<Function>,
    pub topics: Vec<Topic>,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> LagwatchResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LagwatchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LagwatchError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> LagwatchResult<Config> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| LagwatchError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> LagwatchResult<Config> {
        let controller = Self::validate_controller(raw.controller, raw.scaling)?;

        let mut topics = Vec::with_capacity(raw.topics.len());
        let mut seen_topics = HashSet::new();
        for raw_topic in raw.topics {
            let topic = Self::validate_topic(raw_topic)?;
            if !seen_topics.insert(topic.name.clone()) {
                return Err(HardValidationError::DuplicateName {
                    kind: "topic",
                    name: topic.name.to_string(),
                }
                .into());
            }
            topics.push(topic);
        }

        let mut functions = Vec::with_capacity(raw.functions.len());
        let mut seen_functions = HashSet::new();
        for (index, raw_func) in raw.functions.into_iter().enumerate() {
            let func = Self::validate_function(raw_func, index)?;
            if !seen_functions.insert(func.name.clone()) {
                return Err(HardValidationError::DuplicateName {
                    kind: "function",
                    name: func.name.to_string(),
                }
                .into());
            }
            if !seen_topics.contains(&func.input) {
                // Tolerated: the partition count falls back to 1 until the topic appears.
                tracing::warn!(
                    function = %func.name,
                    topic = %func.input,
                    "Function input topic is not declared"
                );
            }
            functions.push(func);
        }

        Ok(Config {
            controller,
            functions,
            topics,
        })
    }

    fn validate_controller(
        raw: RawControllerSection,
        scaling: RawScalingSection,
    ) -> LagwatchResult<ControllerConfig> {
        if raw.scaling_interval_ms == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "scaling_interval_ms",
                value: "0".to_string(),
                reason: "Scaling interval must be greater than 0".to_string(),
            }
            .into());
        }

        if raw.queue_capacity == 0 || raw.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(HardValidationError::InvalidFieldValue {
                field: "queue_capacity",
                value: raw.queue_capacity.to_string(),
                reason: format!("Must be between 1 and {}", MAX_QUEUE_CAPACITY),
            }
            .into());
        }

        if scaling.lag_required_for_one < 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "lag_required_for_one",
                value: scaling.lag_required_for_one.to_string(),
                reason: "Lag thresholds cannot be negative".to_string(),
            }
            .into());
        }

        if scaling.lag_required_for_max <= scaling.lag_required_for_one {
            return Err(HardValidationError::InvalidFieldValue {
                field: "lag_required_for_max",
                value: scaling.lag_required_for_max.to_string(),
                reason: format!(
                    "Must be greater than lag_required_for_one ({})",
                    scaling.lag_required_for_one
                ),
            }
            .into());
        }

        if !(scaling.smoother_greed > 0.0 && scaling.smoother_greed <= 1.0) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "smoother_greed",
                value: scaling.smoother_greed.to_string(),
                reason: "Greed must be in (0, 1]".to_string(),
            }
            .into());
        }

        Ok(ControllerConfig {
            scaling_interval: Duration::from_millis(raw.scaling_interval_ms),
            queue_capacity: raw.queue_capacity,
            health_port: raw.health_port,
            lag_required_for_one: scaling.lag_required_for_one,
            lag_required_for_max: scaling.lag_required_for_max,
            smoother_greed: scaling.smoother_greed,
            default_idle_timeout: Duration::from_millis(scaling.default_idle_timeout_ms),
        })
    }

    fn validate_topic(raw: RawTopic) -> LagwatchResult<Topic> {
        let name = TopicKey::new(raw.name)?;

        if raw.partitions == Some(0) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "partitions",
                value: "0".to_string(),
                reason: format!("Topic {} must have at least one partition", name),
            }
            .into());
        }

        Ok(Topic::new(name, raw.partitions))
    }

    fn validate_function(raw: RawFunction, index: usize) -> LagwatchResult<Function> {
        let context = format!("function at index {}", index);

        let name = FunctionKey::new(raw.name)?;
        let input = raw
            .input
            .ok_or(HardValidationError::MissingRequiredField {
                field: "input",
                context,
            })
            .and_then(TopicKey::new)?;
        let output = raw.output.map(TopicKey::new).transpose()?;

        Ok(Function {
            name,
            input,
            output,
            max_replicas: raw.max_replicas,
            idle_timeout_ms: raw.idle_timeout_ms,
        })
    }
}
