//! Execution engine - probe, validate, then apply

use crate::context::{ApplyContext, ConfirmCallback, ProgressCallback};
use crate::diff::compute_diffs;
use crate::error::{Error, Issue};
use crate::planner::ExecutionPlan;
use crate::resource::Converge;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use rayon::prelude::*;

/// Execute a plan with the given options and callbacks
///
/// 1. Probe every resource (in parallel, `opts.jobs` threads)
/// 2. Validate every resource; any issue aborts before anything is applied
/// 3. Compute diffs and ask for confirmation if there is something to do
/// 4. Apply resources one at a time, in declaration order
///
/// A dry run stops after step 3 and reports validation issues in the
/// summary instead of failing.
pub fn execute<R, P, C>(
    plan: &mut ExecutionPlan<R>,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    R: Converge,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    probe_all(&mut plan.resources, opts.jobs)?;

    let issues = validate_all(&plan.resources);
    if !issues.is_empty() {
        if opts.dry_run {
            return Ok(ExecuteSummary {
                skipped: plan.total_resources(),
                issues,
                ..Default::default()
            });
        }
        return Err(Error::ValidationFailed(issues).into());
    }

    let diffs = compute_diffs(&plan.resources);

    if opts.dry_run {
        return Ok(ExecuteSummary {
            skipped: diffs.len(),
            no_change: plan.total_resources() - diffs.len(),
            ..Default::default()
        });
    }

    if !diffs.is_empty() && !confirm.confirm("Apply changes?")? {
        return Ok(ExecuteSummary {
            skipped: diffs.len(),
            no_change: plan.total_resources() - diffs.len(),
            ..Default::default()
        });
    }

    Ok(apply_all(&mut plan.resources, opts.verbose, progress))
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple<R: Converge>(
    plan: &mut ExecutionPlan<R>,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, opts, &mut NoProgress, &mut AutoConfirm)
}

/// Probe the current state of every resource
///
/// Probing never mutates the system, so resources are probed in parallel.
/// The first hard probe error aborts the run.
pub fn probe_all<R: Converge>(resources: &mut [R], jobs: usize) -> Result<()> {
    if jobs <= 1 || resources.len() <= 1 {
        for resource in resources.iter_mut() {
            probe_one(resource)?;
        }
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create probe thread pool: {}", e))?;

    pool.install(|| resources.par_iter_mut().try_for_each(probe_one))
}

fn probe_one<R: Converge>(resource: &mut R) -> Result<()> {
    log::debug!("Probing {}", resource.id());
    resource.load_current_state().map_err(|e| {
        Error::ProbeFailed {
            resource_id: resource.id(),
            message: format!("{e:#}"),
        }
        .into()
    })
}

/// Collect validation issues from every resource
pub fn validate_all<R: Converge>(resources: &[R]) -> Vec<Issue> {
    resources.iter().flat_map(Converge::validate).collect()
}

/// Apply every resource in order
///
/// Converged resources are not touched unless they ask to always be
/// applied. A failing resource is recorded and the rest still run.
pub fn apply_all<R, P>(resources: &mut [R], verbose: bool, progress: &mut P) -> ExecuteSummary
where
    R: Converge,
    P: ProgressCallback,
{
    let mut summary = ExecuteSummary::default();
    progress.on_batch_start(resources.len());

    for resource in resources.iter_mut() {
        let id = resource.id();
        progress.on_resource_start(&id, &resource.description());

        let result = if resource.needs_update() || resource.always_apply() {
            apply_resource(resource, verbose)
        } else {
            ApplyResult::NoChange
        };

        if let ApplyResult::Failed { error } = &result {
            log::error!("{}: {}", id, error);
        }

        progress.on_resource_complete(&id, &result);
        summary.add_result(&result);
    }

    progress.on_batch_complete();
    summary
}

/// Apply a single resource
fn apply_resource<R: Converge>(resource: &mut R, verbose: bool) -> ApplyResult {
    let mut ctx = ApplyContext::new(false, verbose);

    match resource.apply(&mut ctx) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::types::Probe;
    use crate::{ResourceState, describe_change};

    #[derive(Debug)]
    struct Counter {
        state: ResourceState<u32, Probe<u32>>,
        observed: u32,
        fail_probe: bool,
        issue: Option<String>,
        applies: usize,
    }

    impl Counter {
        fn new(id: &str, observed: u32, desired: u32) -> Self {
            Self {
                state: ResourceState::new(id, desired),
                observed,
                fail_probe: false,
                issue: None,
                applies: 0,
            }
        }
    }

    impl Converge for Counter {
        fn id(&self) -> String {
            format!("test:{}", self.state.identity())
        }

        fn resource_type(&self) -> &'static str {
            "test"
        }

        fn load_current_state(&mut self) -> Result<()> {
            if self.fail_probe {
                anyhow::bail!("probe exploded");
            }
            self.state.set_current(Probe::Value(self.observed));
            Ok(())
        }

        fn validate(&self) -> Vec<Issue> {
            self.issue
                .iter()
                .map(|m| Issue::new(self.id(), m.clone()))
                .collect()
        }

        fn needs_update(&self) -> bool {
            self.state
                .current()
                .is_none_or(|c| c.differs_from(Some(&self.state.desired)))
        }

        fn describe_changes(&self) -> Vec<String> {
            vec![describe_change(
                "value",
                self.observed,
                self.state.desired,
            )]
        }

        fn apply(&mut self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
            if ctx.dry_run {
                return Ok(ApplyResult::Skipped {
                    reason: "Dry run".into(),
                });
            }
            self.applies += 1;
            self.observed = self.state.desired;
            self.state.mark_updated();
            Ok(ApplyResult::Modified)
        }
    }

    #[test]
    fn test_execute_empty_plan() {
        let mut plan: ExecutionPlan<Counter> = ExecutionPlan::new();
        let result = execute_simple(&mut plan, &ExecuteOptions::default()).unwrap();
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_converged_resource_is_not_applied() {
        let mut plan: ExecutionPlan<Counter> = [Counter::new("a", 1, 1)].into_iter().collect();

        let result = execute_simple(&mut plan, &ExecuteOptions::default()).unwrap();

        assert_eq!(result.no_change, 1);
        assert_eq!(plan.resources[0].applies, 0);
        assert!(!plan.resources[0].state.is_updated());
    }

    #[test]
    fn test_execute_with_changes_in_parallel_probe() {
        let mut plan: ExecutionPlan<Counter> = (0..8)
            .map(|i| Counter::new(&i.to_string(), 0, i % 2))
            .collect();

        let result = execute_simple(&mut plan, &ExecuteOptions::default()).unwrap();

        assert_eq!(result.modified, 4);
        assert_eq!(result.no_change, 4);
    }

    #[test]
    fn test_validation_issues_abort_before_apply() {
        let mut broken = Counter::new("b", 0, 1);
        broken.issue = Some("cannot determine user id for 'ghost'".into());
        let mut other = Counter::new("c", 0, 1);
        other.issue = Some("variable does not exist".into());
        let mut plan: ExecutionPlan<Counter> = [broken, other].into_iter().collect();

        let err = execute_simple(&mut plan, &ExecuteOptions::default()).unwrap_err();
        let err = err.downcast_ref::<Error>().unwrap();

        assert_eq!(err.issues().len(), 2);
        assert!(plan.resources.iter().all(|r| r.applies == 0));
    }

    #[test]
    fn test_dry_run_reports_all_issues() {
        let mut broken = Counter::new("b", 0, 1);
        broken.issue = Some("first".into());
        let mut other = Counter::new("c", 0, 1);
        other.issue = Some("second".into());
        let mut plan: ExecutionPlan<Counter> = [broken, other].into_iter().collect();

        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = execute_simple(&mut plan, &opts).unwrap();

        assert_eq!(result.issues.len(), 2);
        assert!(!result.is_success());
    }

    #[test]
    fn test_dry_run_applies_nothing() {
        let mut plan: ExecutionPlan<Counter> = [Counter::new("a", 0, 1)].into_iter().collect();
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };

        let result = execute_simple(&mut plan, &opts).unwrap();

        assert_eq!(result.skipped, 1);
        assert_eq!(plan.resources[0].applies, 0);
    }

    #[test]
    fn test_declined_confirmation_skips() {
        let mut plan: ExecutionPlan<Counter> = [Counter::new("a", 0, 1)].into_iter().collect();

        let result = execute(
            &mut plan,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();

        assert_eq!(result.skipped, 1);
        assert_eq!(plan.resources[0].applies, 0);
    }

    #[test]
    fn test_probe_failure_is_fatal() {
        let mut broken = Counter::new("x", 0, 1);
        broken.fail_probe = true;
        let mut plan: ExecutionPlan<Counter> = [broken].into_iter().collect();

        let err = execute(
            &mut plan,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap_err();

        assert!(err.to_string().contains("failed to probe test:x"));
    }
}
