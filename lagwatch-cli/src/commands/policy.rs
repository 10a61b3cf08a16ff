// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `lagwatch policy` command - Evaluate the base policy once.

use lagwatch_core::{BasePolicy, PartitionedOffsets};

pub fn execute(
    config_path: &str,
    partitions: u32,
    max_replicas: Option<u32>,
    lags: &[i64],
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::controller_config(config_path)?;
    let policy = BasePolicy::from_config(&config);

    let offsets = PartitionedOffsets::from_lags(lags);
    let cap = max_replicas.unwrap_or(partitions).min(partitions);
    let desired = policy.desired_replicas_for_topic(offsets.max_lag(), cap);

    println!("Partitions:       {}", partitions);
    println!("Replica cap:      {}", cap);
    println!("Max partition lag: {}", offsets.max_lag());
    println!("Desired replicas: {}", desired);
    Ok(())
}
