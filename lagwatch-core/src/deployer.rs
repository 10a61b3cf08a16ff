// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Deployment back-end interface.

use std::collections::HashMap;

use crate::error::DeployerError;
use crate::feed::{EventSender, ResourceEvent};
use crate::types::{DeploymentStatus, Function, FunctionKey};

/// Operations the controller issues against the platform running the
/// functions. Calls are made from the controller loop and must not block
/// on the controller's own event queue.
pub trait Deployer {
    fn deploy(&mut self, function: &Function) -> Result<(), DeployerError>;

    fn undeploy(&mut self, function: &Function) -> Result<(), DeployerError>;

    /// Re-apply a changed definition, keeping `replicas` running.
    fn update(&mut self, function: &Function, replicas: u32) -> Result<(), DeployerError>;

    fn scale(&mut self, function: &Function, replicas: u32) -> Result<(), DeployerError>;
}

/// Deployer that only records what it was asked to do.
///
/// When given an [`EventSender`] it reports each change back as a
/// deployment status, the way a real platform's watch would.
#[derive(Debug, Default)]
pub struct DryRunDeployer {
    replicas: HashMap<FunctionKey, u32>,
    status: Option<EventSender>,
}

impl DryRunDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reporting_to(status: EventSender) -> Self {
        Self {
            replicas: HashMap::new(),
            status: Some(status),
        }
    }

    /// Start reporting status changes to `status`.
    pub fn report_to(&mut self, status: EventSender) {
        self.status = Some(status);
    }

    /// Replicas currently running per deployed function.
    pub fn replicas(&self) -> &HashMap<FunctionKey, u32> {
        &self.replicas
    }

    fn report(&self, event: ResourceEvent<DeploymentStatus>) {
        if let Some(status) = &self.status {
            if let Err(e) = status.try_send(event.into()) {
                tracing::warn!(error = %e, "Dropped deployment status report");
            }
        }
    }
}

impl Deployer for DryRunDeployer {
    fn deploy(&mut self, function: &Function) -> Result<(), DeployerError> {
        tracing::info!(function = %function.name, input = %function.input, "Deploy");
        self.replicas.insert(function.name.clone(), 0);
        self.report(ResourceEvent::Added(DeploymentStatus::for_function(
            &function.name,
            0,
        )));
        Ok(())
    }

    fn undeploy(&mut self, function: &Function) -> Result<(), DeployerError> {
        tracing::info!(function = %function.name, "Undeploy");
        self.replicas.remove(&function.name);
        self.report(ResourceEvent::Deleted(DeploymentStatus::for_function(
            &function.name,
            0,
        )));
        Ok(())
    }

    fn update(&mut self, function: &Function, replicas: u32) -> Result<(), DeployerError> {
        tracing::info!(function = %function.name, replicas, "Update");
        self.replicas.insert(function.name.clone(), replicas);
        self.report(ResourceEvent::Updated(DeploymentStatus::for_function(
            &function.name,
            replicas,
        )));
        Ok(())
    }

    fn scale(&mut self, function: &Function, replicas: u32) -> Result<(), DeployerError> {
        if !self.replicas.contains_key(&function.name) {
            return Err(DeployerError::Rejected {
                function: function.name.clone(),
                operation: "scale",
                reason: "function is not deployed".to_string(),
            });
        }
        tracing::info!(function = %function.name, replicas, "Scale");
        self.replicas.insert(function.name.clone(), replicas);
        self.report(ResourceEvent::Updated(DeploymentStatus::for_function(
            &function.name,
            replicas,
        )));
        Ok(())
    }
}
