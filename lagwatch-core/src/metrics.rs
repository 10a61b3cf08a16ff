// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Prometheus metrics for the scaling controller.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounter,
    IntCounterVec, IntGaugeVec,
};

use crate::types::{FunctionKey, TopicKey};

/// Values of the `operation` label on deployer errors.
pub const DEPLOYER_OPERATIONS: [&str; 4] = ["deploy", "undeploy", "update", "scale"];

lazy_static! {
    pub static ref SCALE_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "lagwatch_scale_requests_total",
        "Scale requests issued to the deployer",
        &["function"]
    )
    .unwrap();
    pub static ref DEPLOYER_ERRORS: IntCounterVec = register_int_counter_vec!(
        "lagwatch_deployer_errors_total",
        "Deployer operations that failed",
        &["function", "operation"]
    )
    .unwrap();
    pub static ref DESIRED_REPLICAS: IntGaugeVec = register_int_gauge_vec!(
        "lagwatch_desired_replicas",
        "Replica count last successfully requested from the deployer",
        &["function"]
    )
    .unwrap();
    pub static ref PARTITION_LAG: IntGaugeVec = register_int_gauge_vec!(
        "lagwatch_partition_lag",
        "Largest partition lag of a function input",
        &["function", "topic"]
    )
    .unwrap();
    pub static ref TICKS: IntCounter =
        register_int_counter!("lagwatch_ticks_total", "Scaling ticks evaluated").unwrap();
}

/// Register every metric so they show up before their first update.
pub fn init() {
    lazy_static::initialize(&SCALE_REQUESTS);
    lazy_static::initialize(&DEPLOYER_ERRORS);
    lazy_static::initialize(&DESIRED_REPLICAS);
    lazy_static::initialize(&PARTITION_LAG);
    lazy_static::initialize(&TICKS);
}

pub fn record_partition_lag(function: &FunctionKey, topic: &TopicKey, lag: i64) {
    PARTITION_LAG
        .with_label_values(&[function.as_str(), topic.as_str()])
        .set(lag);
}

pub fn record_scale(function: &FunctionKey, replicas: u32) {
    SCALE_REQUESTS.with_label_values(&[function.as_str()]).inc();
    DESIRED_REPLICAS
        .with_label_values(&[function.as_str()])
        .set(i64::from(replicas));
}

pub fn record_deployer_error(function: &FunctionKey, operation: &str) {
    DEPLOYER_ERRORS
        .with_label_values(&[function.as_str(), operation])
        .inc();
}

/// Drop the lag series of an input a function no longer consumes.
pub fn forget_input(function: &FunctionKey, topic: &TopicKey) {
    let _ = PARTITION_LAG.remove_label_values(&[function.as_str(), topic.as_str()]);
}

/// Drop per-function series once a function is deleted.
pub fn forget_function(function: &FunctionKey, input: &TopicKey) {
    let _ = SCALE_REQUESTS.remove_label_values(&[function.as_str()]);
    let _ = DESIRED_REPLICAS.remove_label_values(&[function.as_str()]);
    for operation in DEPLOYER_OPERATIONS {
        let _ = DEPLOYER_ERRORS.remove_label_values(&[function.as_str(), operation]);
    }
    forget_input(function, input);
}

/// Current metrics in the Prometheus text format.
pub fn render() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_else(|_| String::from("Encoding error"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_is_rendered() {
        init();
        let f = FunctionKey::new("metrics-test-fn").unwrap();
        record_scale(&f, 4);
        assert_eq!(DESIRED_REPLICAS.with_label_values(&["metrics-test-fn"]).get(), 4);

        let text = render();
        assert!(text.contains("lagwatch_scale_requests_total"));
        assert!(text.contains("metrics-test-fn"));
    }

    #[test]
    fn test_forget_function() {
        let f = FunctionKey::new("metrics-forget-fn").unwrap();
        let input = TopicKey::new("metrics-forget-input").unwrap();
        record_scale(&f, 2);
        record_partition_lag(&f, &input, 7);
        record_deployer_error(&f, "deploy");
        record_deployer_error(&f, "scale");
        assert!(render().contains("metrics-forget-input"));

        forget_function(&f, &input);
        let text = render();
        assert!(!text.contains("metrics-forget-fn"));
        assert!(!text.contains("metrics-forget-input"));
    }

    #[test]
    fn test_forget_input_keeps_other_inputs() {
        let f = FunctionKey::new("metrics-moved-fn").unwrap();
        let old = TopicKey::new("metrics-old-input").unwrap();
        let new = TopicKey::new("metrics-new-input").unwrap();
        record_partition_lag(&f, &old, 3);
        record_partition_lag(&f, &new, 5);

        forget_input(&f, &old);
        let text = render();
        assert!(!text.contains("metrics-old-input"));
        assert!(text.contains("metrics-new-input"));
    }
}
