// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers and resource models.
//!
//! Resource identities validate their invariants at creation time, following
//! the "Newtype" pattern. Keys carry only a name: every function and topic is
//! assumed to live in the single namespace the controller is deployed into.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Kubernetes object names are DNS subdomains: at most 253 characters.
const MAX_NAME_LEN: usize = 253;

/// Label set on function deployments that names the owning function.
pub const FUNCTION_LABEL: &str = "function";

fn validate_name(field: &'static str, name: String) -> Result<String, HardValidationError> {
    if name.is_empty() {
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value: name,
            reason: "Name cannot be empty".to_string(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        let len = name.len();
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value: name,
            reason: format!("Name too long: {} chars (max {})", len, MAX_NAME_LEN),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value: name,
            reason: "Name must contain only alphanumeric characters, hyphens, underscores and dots"
                .to_string(),
        });
    }

    Ok(name)
}

/// Validated function identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionKey(String);

impl FunctionKey {
    /// Create a new FunctionKey with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        validate_name("function", name.into()).map(Self)
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FunctionKey {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FunctionKey> for String {
    fn from(key: FunctionKey) -> Self {
        key.0
    }
}

/// Validated topic identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicKey(String);

impl TopicKey {
    /// Create a new TopicKey with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        validate_name("topic", name.into()).map(Self)
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TopicKey {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TopicKey> for String {
    fn from(key: TopicKey) -> Self {
        key.0
    }
}

/// A tracked (topic, consumer group) pair. The group is always the name of
/// the function consuming the topic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub topic: TopicKey,
    pub group: FunctionKey,
}

impl Subscription {
    pub fn new(topic: TopicKey, group: FunctionKey) -> Self {
        Self { topic, group }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.group)
    }
}

/// A declared function: a consumer-group worker bound to an input topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: FunctionKey,
    pub input: TopicKey,
    #[serde(default)]
    pub output: Option<TopicKey>,
    #[serde(default)]
    pub max_replicas: Option<u32>,
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

impl Function {
    /// Create a function with no optional fields set.
    pub fn new(name: FunctionKey, input: TopicKey) -> Self {
        Self {
            name,
            input,
            output: None,
            max_replicas: None,
            idle_timeout_ms: None,
        }
    }

    /// The subscription this function's input is consumed through.
    pub fn subscription(&self) -> Subscription {
        Subscription::new(self.input.clone(), self.name.clone())
    }

    /// Fill unset schema defaults.
    pub fn with_defaults(mut self, default_idle_timeout: Duration) -> Self {
        if self.idle_timeout_ms.is_none() {
            self.idle_timeout_ms = Some(default_idle_timeout.as_millis() as u64);
        }
        self
    }

    /// How long the function must stay idle before it is scaled to zero.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

/// A declared partitioned message stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: TopicKey,
    #[serde(default)]
    pub partitions: Option<u32>,
}

impl Topic {
    pub fn new(name: TopicKey, partitions: Option<u32>) -> Self {
        Self { name, partitions }
    }

    /// Fill unset schema defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.partitions.is_none() {
            self.partitions = Some(1);
        }
        self
    }

    /// Partition count, defaulting to 1 when unset.
    pub fn partition_count(&self) -> u32 {
        self.partitions.unwrap_or(1)
    }
}

/// Observed status of a deployment on the orchestration platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub replicas: u32,
}

impl DeploymentStatus {
    /// Status of a deployment labelled as belonging to `function`.
    pub fn for_function(function: &FunctionKey, replicas: u32) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(FUNCTION_LABEL.to_string(), function.to_string());
        Self {
            name: function.to_string(),
            labels,
            replicas,
        }
    }

    /// The function owning this deployment, if it carries a valid function label.
    pub fn function_key(&self) -> Option<FunctionKey> {
        self.labels
            .get(FUNCTION_LABEL)
            .filter(|name| !name.is_empty())
            .and_then(|name| FunctionKey::new(name.as_str()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_key_valid() {
        assert!(FunctionKey::new("my-function").is_ok());
        assert!(FunctionKey::new("function_123").is_ok());
        assert!(FunctionKey::new("squares.v2").is_ok());
    }

    #[test]
    fn test_function_key_invalid() {
        assert!(FunctionKey::new("").is_err());
        assert!(FunctionKey::new("a".repeat(254)).is_err());
        assert!(FunctionKey::new("func@name").is_err());
        assert!(FunctionKey::new("func name").is_err());
    }

    #[test]
    fn test_topic_key_invalid() {
        assert!(TopicKey::new("").is_err());
        assert!(TopicKey::new("in/put").is_err());
    }

    #[test]
    fn test_function_defaults() {
        let f = Function::new(
            FunctionKey::new("fn").unwrap(),
            TopicKey::new("input").unwrap(),
        )
        .with_defaults(Duration::from_secs(10));
        assert_eq!(f.idle_timeout(), Some(Duration::from_secs(10)));

        let mut g = f.clone();
        g.idle_timeout_ms = Some(300);
        let g = g.with_defaults(Duration::from_secs(10));
        assert_eq!(g.idle_timeout(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_subscription_uses_function_as_group() {
        let f = Function::new(
            FunctionKey::new("fn").unwrap(),
            TopicKey::new("input").unwrap(),
        );
        let s = f.subscription();
        assert_eq!(s.topic.as_str(), "input");
        assert_eq!(s.group.as_str(), "fn");
        assert_eq!(s.to_string(), "input/fn");
    }

    #[test]
    fn test_topic_partition_default() {
        let t = Topic::new(TopicKey::new("input").unwrap(), None);
        assert_eq!(t.partition_count(), 1);
        assert_eq!(t.with_defaults().partitions, Some(1));
    }

    #[test]
    fn test_deployment_function_label() {
        let key = FunctionKey::new("fn").unwrap();
        let status = DeploymentStatus::for_function(&key, 2);
        assert_eq!(status.function_key(), Some(key));

        let unlabelled = DeploymentStatus {
            name: "other".to_string(),
            labels: BTreeMap::new(),
            replicas: 1,
        };
        assert_eq!(unlabelled.function_key(), None);
    }
}
