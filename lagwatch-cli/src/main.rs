// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lagwatch CLI
//!
//! Command-line interface for the Lagwatch lag-driven autoscaler.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod server;
mod simulation;

/// Lagwatch - Scale message-driven functions on consumer lag
#[derive(Parser)]
#[command(name = "lagwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "lagwatch.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the controller against an in-memory broker
    Run {
        /// Messages per second produced onto every function input
        #[arg(long, default_value_t = 0)]
        load: u64,
    },

    /// Drive the scaling pipeline with a scripted workload
    Simulate {
        /// Number of simulation steps
        #[arg(long, default_value_t = 10_000)]
        steps: u64,

        /// Partitions of the simulated input topic
        #[arg(long, default_value_t = 16)]
        partitions: u32,

        /// Output data file
        #[arg(short, long, default_value = "scaler.dat")]
        output: PathBuf,
    },

    /// Evaluate the base policy for one input
    Policy {
        /// Partitions of the input topic
        #[arg(long)]
        partitions: u32,

        /// Replica cap of the function
        #[arg(long)]
        max_replicas: Option<u32>,

        /// Lag of each partition, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        lag: Vec<i64>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run { load } => commands::run::execute(&cli.config, load).await,
        Commands::Simulate {
            steps,
            partitions,
            output,
        } => commands::simulate::execute(&cli.config, steps, partitions, &output),
        Commands::Policy {
            partitions,
            max_replicas,
            lag,
        } => commands::policy::execute(&cli.config, partitions, max_replicas, &lag),
        Commands::Validate { file } => commands::validate::execute(&file),
    }
}
