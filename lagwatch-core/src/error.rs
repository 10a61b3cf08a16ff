// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for Lagwatch.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{FunctionKey, TopicKey};

/// Top-level error type for the Lagwatch controller.
#[derive(Debug, Error)]
pub enum LagwatchError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Collaborator Errors - Logged and Swallowed Inside the Event Loop
    // =========================================================================
    #[error("Messaging backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Deployer error: {0}")]
    Deployer(#[from] DeployerError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Controller event queue is closed")]
    QueueClosed,

    #[error("Controller event queue is full")]
    QueueFull,
}

/// Hard validation errors prevent startup.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },
}

/// Failures talking to the messaging backend while measuring lag.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable for topic {topic}: {reason}")]
    BackendUnavailable { topic: TopicKey, reason: String },

    #[error("Partition {partition} of topic {topic} unavailable: {reason}")]
    PartitionUnavailable {
        topic: TopicKey,
        partition: i32,
        reason: String,
    },

    #[error("Unknown topic: {topic}")]
    UnknownTopic { topic: TopicKey },
}

/// Failures reported by the deployer.
#[derive(Debug, Error)]
pub enum DeployerError {
    #[error("{operation} of function {function} rejected: {reason}")]
    Rejected {
        function: FunctionKey,
        operation: &'static str,
        reason: String,
    },
}

/// Result type alias using LagwatchError.
pub type LagwatchResult<T> = Result<T, LagwatchError>;
