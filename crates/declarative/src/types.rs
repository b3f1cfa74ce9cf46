//! Core types for declarative resource management

use crate::error::Issue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An observed attribute of a managed resource
///
/// `NotProbed` and `Absent` are different answers: the first means nobody
/// asked (the attribute is not managed), the second means the system was
/// asked and the thing does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Probe<T> {
    /// The attribute was never looked at
    #[default]
    NotProbed,
    /// The resource (or attribute) does not exist on the system
    Absent,
    /// The observed value
    Value(T),
}

impl<T> Probe<T> {
    /// Observed value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Check if the attribute was probed at all
    pub fn is_probed(&self) -> bool {
        !matches!(self, Self::NotProbed)
    }

    /// Check if the probe found nothing
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Map the observed value
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Probe<U> {
        match self {
            Self::NotProbed => Probe::NotProbed,
            Self::Absent => Probe::Absent,
            Self::Value(v) => Probe::Value(f(v)),
        }
    }
}

impl<T: PartialEq> Probe<T> {
    /// Whether converging to `desired` would change this attribute
    ///
    /// An unset desired value is never compared. A set desired value
    /// differs from anything but an equal observed value.
    pub fn differs_from(&self, desired: Option<&T>) -> bool {
        match (desired, self) {
            (None, _) => false,
            (Some(target), Self::Value(current)) => current != target,
            (Some(_), _) => true,
        }
    }
}

impl<T> From<Option<T>> for Probe<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Self::Value)
    }
}

impl<T: fmt::Display> fmt::Display for Probe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => v.fmt(f),
            _ => Ok(()),
        }
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
    /// Validation problems found by a dry run
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures, no issues)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.issues.is_empty()
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
        self.issues.extend(other.issues.iter().cloned());
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just report what would happen
    pub dry_run: bool,
    /// Number of threads used to probe current state
    pub jobs: usize,
    /// Verbose output
    pub verbose: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            verbose: false,
        }
    }
}
