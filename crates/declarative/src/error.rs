//! Error types for the declarative crate

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A requirement that a resource cannot satisfy
///
/// Issues are collected during the validation phase, after probing and
/// before anything is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Identifier of the resource that raised the issue
    pub resource_id: String,
    /// Human-readable description of the problem
    pub message: String,
}

impl Issue {
    pub fn new(resource_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource_id, self.message)
    }
}

/// Errors raised by the execution driver
#[derive(Debug, Error)]
pub enum Error {
    /// One or more resources failed validation; nothing was applied
    #[error("{} requirement(s) not met:\n{}", .0.len(), render_issues(.0))]
    ValidationFailed(Vec<Issue>),

    /// Probing a resource's current state failed
    #[error("failed to probe {resource_id}: {message}")]
    ProbeFailed { resource_id: String, message: String },
}

impl Error {
    /// Issues carried by a validation failure
    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::ValidationFailed(issues) => issues,
            Self::ProbeFailed { .. } => &[],
        }
    }
}

fn render_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
