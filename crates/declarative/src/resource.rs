//! The convergence contract
//!
//! A resource knows how to probe the system for the attributes it manages,
//! report what it would change, and change only that.

use crate::context::ApplyContext;
use crate::error::Issue;
use crate::types::ApplyResult;
use anyhow::Result;
use std::fmt;

/// Desired and current state of one managed entity
///
/// `current` is `None` until the provider has probed the system. The
/// `updated` flag starts false and only ever flips to true.
#[derive(Debug, Clone)]
pub struct ResourceState<D, C> {
    identity: String,
    /// What the declaration asks for
    pub desired: D,
    current: Option<C>,
    updated: bool,
}

impl<D, C> ResourceState<D, C> {
    pub fn new(identity: impl Into<String>, desired: D) -> Self {
        Self {
            identity: identity.into(),
            desired,
            current: None,
            updated: false,
        }
    }

    /// Stable name of the managed thing (path, variable name, URI)
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Probed state, if loaded
    pub fn current(&self) -> Option<&C> {
        self.current.as_ref()
    }

    /// Mutable access to the probed state
    pub fn current_mut(&mut self) -> Option<&mut C> {
        self.current.as_mut()
    }

    /// Replace the probed state
    pub fn set_current(&mut self, current: C) {
        self.current = Some(current);
    }

    /// Whether the current state was loaded
    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Record that an applying operation changed the system
    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    /// Whether anything was changed during this run
    pub fn is_updated(&self) -> bool {
        self.updated
    }
}

/// Core trait for convergent resources
///
/// The executor drives every resource through the same sequence:
///
/// 1. [`load_current_state`](Converge::load_current_state) - probe only the
///    attributes the desired state sets. Never mutates the system.
/// 2. [`validate`](Converge::validate) - report every problem found while
///    probing, without side effects.
/// 3. [`needs_update`](Converge::needs_update) and
///    [`describe_changes`](Converge::describe_changes) - the diff.
/// 4. [`apply`](Converge::apply) - one system call per differing
///    attribute. Failures of those calls are returned unchanged.
pub trait Converge: Send + fmt::Debug {
    /// Unique identifier for this resource (e.g. "file:/etc/motd", "env:PATH")
    fn id(&self) -> String;

    /// Resource type category, used for grouping and target filtering
    fn resource_type(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> String {
        self.id()
    }

    /// Probe the system for the managed attributes
    fn load_current_state(&mut self) -> Result<()>;

    /// Problems discovered while probing
    fn validate(&self) -> Vec<Issue> {
        Vec::new()
    }

    /// Whether any managed attribute differs from its desired value
    fn needs_update(&self) -> bool;

    /// One line per attribute that would change, in a fixed attribute order
    fn describe_changes(&self) -> Vec<String>;

    /// Converge the differing attributes
    ///
    /// Must return [`ApplyResult::NoChange`] without touching the system
    /// when everything already matches, and respect `ctx.dry_run`.
    fn apply(&mut self, ctx: &mut ApplyContext) -> Result<ApplyResult>;

    /// Whether `apply` should run even when `needs_update` is false
    ///
    /// Resources whose freshness can only be learned by acting (for
    /// example a conditional download) override this.
    fn always_apply(&self) -> bool {
        false
    }
}
