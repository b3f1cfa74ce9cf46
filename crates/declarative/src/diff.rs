//! Diff computation for resources

use crate::resource::Converge;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

/// Pending changes for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Unique identifier of the resource
    pub resource_id: String,
    /// Type of the resource
    pub resource_type: String,
    /// Human-readable description
    pub description: String,
    /// One line per attribute that would change
    pub changes: Vec<String>,
}

impl ResourceDiff {
    /// Create a diff from a probed resource, returning None if it is converged
    pub fn from_resource<R: Converge + ?Sized>(resource: &R) -> Option<Self> {
        if !resource.needs_update() {
            return None;
        }

        Some(Self {
            resource_id: resource.id(),
            resource_type: resource.resource_type().to_string(),
            description: resource.description(),
            changes: resource.describe_changes(),
        })
    }
}

/// Format a single attribute change
///
/// ```
/// assert_eq!(
///     declarative::describe_change("mode", "0644", "0600"),
///     "change mode from '0644' to '0600'"
/// );
/// ```
pub fn describe_change(attribute: &str, from: impl Display, to: impl Display) -> String {
    format!("change {attribute} from '{from}' to '{to}'")
}

/// Compute diffs for a list of probed resources
///
/// Returns only resources that differ from their desired state.
pub fn compute_diffs<R: Converge>(resources: &[R]) -> Vec<ResourceDiff> {
    resources.iter().filter_map(ResourceDiff::from_resource).collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources with pending changes
    pub resources: usize,
    /// Number of individual attribute changes
    pub changes: usize,
}

impl DiffSummary {
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        Self {
            resources: diffs.len(),
            changes: diffs.iter().map(|d| d.changes.len().max(1)).sum(),
        }
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.resources > 0
    }
}

/// Group diffs by resource type
pub fn group_by_type(diffs: &[ResourceDiff]) -> HashMap<String, Vec<&ResourceDiff>> {
    let mut groups: HashMap<String, Vec<&ResourceDiff>> = HashMap::new();
    for diff in diffs {
        groups
            .entry(diff.resource_type.clone())
            .or_default()
            .push(diff);
    }
    groups
}
