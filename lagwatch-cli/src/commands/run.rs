// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `lagwatch run` command - Run the controller against an in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use lagwatch_core::{
    metrics, BackendLagTracker, ConfigLoader, Controller, DryRunDeployer, InMemoryBroker,
    ScalingPolicy, StaticFeed, TopicKey,
};

use crate::server;

pub async fn execute(config_path: &str, load: u64) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, "Starting controller");

    // Fail fast on invalid config
    let config = ConfigLoader::load_file(config_path)?;
    metrics::init();

    let broker = Arc::new(InMemoryBroker::new());
    for topic in &config.topics {
        broker.create_topic(&topic.name, topic.partition_count());
    }
    for function in &config.functions {
        if broker.partition_count(&function.input).is_none() {
            broker.create_topic(&function.input, 1);
        }
    }

    let mut controller = Controller::new(
        config.controller.clone(),
        BackendLagTracker::new(Arc::clone(&broker)),
        DryRunDeployer::new(),
    );
    controller.set_scaling_policy(ScalingPolicy::standard(&config.controller));
    let status = controller.event_sender();
    controller.deployer_mut().report_to(status);
    controller.add_feed(StaticFeed::from_resources(
        config.functions.clone(),
        config.topics.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.controller.health_port != 0 {
        let port = config.controller.health_port;
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(port, shutdown).await {
                tracing::error!("Health endpoint failed: {}", e);
            }
        });
    }

    if load > 0 {
        let inputs: Vec<TopicKey> = config.functions.iter().map(|f| f.input.clone()).collect();
        tokio::spawn(produce_load(Arc::clone(&broker), inputs, load, shutdown_rx.clone()));
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    println!(
        "Lagwatch controller running: {} functions, {} topics (Ctrl-C to stop)",
        config.functions.len(),
        config.topics.len()
    );

    controller.run(shutdown_rx).await;

    println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
    Ok(())
}

/// Produce `rate` messages per second onto every input topic.
async fn produce_load(
    broker: Arc<InMemoryBroker>,
    inputs: Vec<TopicKey>,
    rate: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                for topic in &inputs {
                    if let Err(e) = broker.produce_spread(topic, rate) {
                        tracing::warn!(topic = %topic, error = %e, "Failed to produce load");
                    }
                }
            }
        }
    }
}
