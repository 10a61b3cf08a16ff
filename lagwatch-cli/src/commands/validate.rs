// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `lagwatch validate` command - Validate configuration file.

use lagwatch_core::ConfigLoader;

pub fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let c = &config.controller;
            println!("✓ Configuration is valid");
            println!();
            println!("Controller Settings:");
            println!("  Scaling Interval:   {}ms", c.scaling_interval.as_millis());
            println!("  Queue Capacity:     {}", c.queue_capacity);
            println!("  Health Port:        {}", c.health_port);
            println!(
                "  Lag For One/Max:    {}/{}",
                c.lag_required_for_one, c.lag_required_for_max
            );
            println!("  Smoother Greed:     {}", c.smoother_greed);
            println!("  Idle Timeout:       {}ms", c.default_idle_timeout.as_millis());
            println!();
            println!("Topics ({}):", config.topics.len());
            for topic in &config.topics {
                println!("  - {} (partitions: {})", topic.name, topic.partition_count());
            }
            println!();
            println!("Functions ({}):", config.functions.len());
            for func in &config.functions {
                let max = func
                    .max_replicas
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "partitions".to_string());
                println!(
                    "  - {} (input: {}, max replicas: {}, idle timeout: {}ms)",
                    func.name,
                    func.input,
                    max,
                    func.idle_timeout_ms.unwrap_or(c.default_idle_timeout.as_millis() as u64)
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
