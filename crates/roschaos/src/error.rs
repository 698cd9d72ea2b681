// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy shared by every layer of the toolkit.
//!
//! Selection failures (enumeration, pattern compilation, usage) abort an
//! action. Execution failures are collected per target by the worker pool
//! and only surface as [`ChaosError::PartialFailure`] once the batch is done.

use crate::config::ConfigError;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ChaosError>;

/// Exit code for invalid or missing command-line arguments.
pub const EXIT_USAGE: i32 = 2;

/// Exit code used when the operator interrupts a run.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Toolkit errors.
#[derive(Debug, Error)]
pub enum ChaosError {
    /// No connection could be made (refused, unreachable, unresolvable).
    #[error("Communication with {target} failed: {reason}")]
    Communication { target: String, reason: String },

    /// The request went out but no reply arrived (timeout, connection closed).
    #[error("No reply from {target}")]
    NoReply { target: String },

    /// The registry (or a node-local service) answered with a failure status.
    #[error("{method} failed with code {code}: {message}")]
    RegistryProtocol {
        method: String,
        code: i32,
        message: String,
    },

    /// The registry has no address for a node or service.
    #[error("No address registered for {name}")]
    AddressNotFound { name: String },

    /// A peer lacks an optional capability.
    #[error("{target} does not support {operation}")]
    Unsupported { target: String, operation: String },

    #[error("Invalid {attribute} pattern: {source}")]
    InvalidPattern {
        attribute: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("{0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed XML-RPC or service-call payload.
    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("{failed} of {total} targets failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Interrupted")]
    Interrupted,
}

impl ChaosError {
    pub fn communication(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Communication {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn no_reply(target: impl Into<String>) -> Self {
        Self::NoReply {
            target: target.into(),
        }
    }

    pub fn protocol(method: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::RegistryProtocol {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    pub fn unsupported(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            target: target.into(),
            operation: operation.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) | Self::InvalidPattern { .. } => EXIT_USAGE,
            Self::Interrupted => EXIT_INTERRUPTED,
            _ => 1,
        }
    }

    /// Single-line rendering for the top-level diagnostic.
    ///
    /// Regex syntax errors span several lines; they are folded here.
    pub fn diagnostic(&self) -> String {
        self.to_string()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether the error should be printed before exiting.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Socket-level failure, whether or not the request went out.
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication { .. } | Self::NoReply { .. })
    }
}
