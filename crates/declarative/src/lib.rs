//! # Declarative
//!
//! The convergence contract shared by every resource provider.
//!
//! A provider is handed a *desired state*, probes the system for the
//! *current state* of exactly the attributes it was asked to manage,
//! decides whether anything differs, and applies only the differing
//! attributes. Running the same declaration twice must leave the system
//! untouched the second time.
//!
//! ## Core Concepts
//!
//! - **ResourceState**: desired/current pair for one managed entity plus the
//!   `updated` flag
//! - **Probe**: an observed attribute - never probed, absent, or a value
//! - **Converge**: the provider trait (`load_current_state`, `validate`,
//!   `needs_update`, `describe_changes`, `apply`)
//! - **ExecutionPlan**: the resources of one run, filterable by target
//! - **Executor**: probe everything, validate everything, then apply
//!
//! ## Two phases
//!
//! Probing never mutates the system. Problems discovered while probing
//! (an owner name that does not resolve, a variable that must already
//! exist) are held by the resource and reported by [`Converge::validate`].
//! The executor collects every issue from every resource before deciding
//! whether to apply anything, so a dry run can enumerate all problems at
//! once.
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ApplyContext, ApplyResult, Converge, Probe, ResourceState};
//!
//! #[derive(Debug)]
//! struct Motd {
//!     state: ResourceState<String, Probe<String>>,
//! }
//!
//! impl Converge for Motd {
//!     fn id(&self) -> String { self.state.identity().to_string() }
//!     fn resource_type(&self) -> &'static str { "motd" }
//!
//!     fn load_current_state(&mut self) -> anyhow::Result<()> {
//!         let current = std::fs::read_to_string("/etc/motd").ok();
//!         self.state.set_current(Probe::from(current));
//!         Ok(())
//!     }
//!
//!     fn needs_update(&self) -> bool {
//!         self.state.current().is_none_or(|c| c.differs_from(Some(&self.state.desired)))
//!     }
//!
//!     fn describe_changes(&self) -> Vec<String> { Vec::new() }
//!
//!     fn apply(&mut self, ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
//!         if ctx.dry_run {
//!             return Ok(ApplyResult::Skipped { reason: "Dry run".into() });
//!         }
//!         std::fs::write("/etc/motd", &self.state.desired)?;
//!         self.state.mark_updated();
//!         Ok(ApplyResult::Modified)
//!     }
//! }
//! ```

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback,
};
pub use diff::{DiffSummary, ResourceDiff, compute_diffs, describe_change, group_by_type};
pub use error::{Error, Issue};
pub use executor::{apply_all, execute, execute_simple, probe_all, validate_all};
pub use planner::ExecutionPlan;
pub use resource::{Converge, ResourceState};
pub use types::{ApplyResult, ExecuteOptions, ExecuteSummary, Probe};
