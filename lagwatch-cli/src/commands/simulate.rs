// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `lagwatch simulate` command - Drive the scaling pipeline with a scripted workload.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::simulation;

pub fn execute(
    config_path: &str,
    steps: u64,
    partitions: u32,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::controller_config(config_path)?;
    tracing::info!(steps, partitions, output = %output.display(), "Starting simulation");

    let out = BufWriter::new(File::create(output)?);
    simulation::simulate_to(&config, steps, partitions, out)?;

    println!("Simulation completed: {} steps written to {}", steps, output.display());
    Ok(())
}
