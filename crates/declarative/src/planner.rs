//! Execution planner - the resources of one run

use crate::resource::Converge;

/// An execution plan: the resources of one run, in declaration order
#[derive(Debug)]
pub struct ExecutionPlan<R> {
    /// Resources to converge
    pub resources: Vec<R>,
}

impl<R: Converge> ExecutionPlan<R> {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
        }
    }

    /// Add a resource to the plan
    pub fn add_resource(&mut self, resource: R) {
        self.resources.push(resource);
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&R) -> bool,
    {
        Self {
            resources: self.resources.into_iter().filter(|r| predicate(r)).collect(),
        }
    }

    /// Filter plan to only include resources matching a target pattern
    ///
    /// Target format: "type" or "type.name". The name must equal the
    /// resource's identity exactly, so "env.PATH" does not select MANPATH.
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.filter(|r| matches_filter(r, resource_type.as_deref(), name.as_deref()))
            }
        }
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.resources.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl<R: Converge> Default for ExecutionPlan<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Converge> FromIterator<R> for ExecutionPlan<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}

/// Canonical resource type for a target prefix, if it names one
fn canonical_type(prefix: &str) -> Option<&'static str> {
    match prefix {
        "file" | "files" => Some("file"),
        "env" | "envs" | "environment" => Some("env"),
        "remote_file" | "remote_files" | "remote" => Some("remote_file"),
        _ => None,
    }
}

/// Parse a target string like "env.PATH" into (type, name)
///
/// Anything before the first dot that is not a known type is treated as
/// part of the name, so "/etc/app.conf" stays a name.
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    if let Some(kind) = canonical_type(target) {
        return (Some(kind.to_string()), None);
    }

    match target.split_once('.') {
        Some((prefix, rest)) => match canonical_type(prefix) {
            Some(kind) => (Some(kind.to_string()), Some(rest.to_string())),
            None => (None, Some(target.to_string())),
        },
        None => (None, Some(target.to_string())),
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter<R: Converge>(
    resource: &R,
    resource_type: Option<&str>,
    name: Option<&str>,
) -> bool {
    if let Some(rt) = resource_type
        && resource.resource_type() != rt
    {
        return false;
    }

    if let Some(n) = name
        && identity(&resource.id()) != n
    {
        return false;
    }

    true
}

/// Identity part of a resource id ("env:PATH" -> "PATH")
fn identity(id: &str) -> &str {
    id.split_once(':').map_or(id, |(_, rest)| rest)
}
