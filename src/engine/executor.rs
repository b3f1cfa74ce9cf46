//! Execution engine - steward's executor with UI integration

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyResult, ConfirmCallback, Converge, ExecuteSummary, ExecutionPlan, Issue,
    ProgressCallback, apply_all, compute_diffs, probe_all, validate_all,
};
use indicatif::ProgressBar;

use super::differ::{display_diff, display_issues};
use crate::progress;
use crate::resource::Resource;

/// Options for execution (includes `yes` for confirmation skip)
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of threads used to probe
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Verbose output
    pub verbose: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
            verbose: false,
        }
    }
}

/// Progress bar fed by the apply loop
struct BarProgress {
    pb: Option<ProgressBar>,
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, count: usize) {
        self.pb = Some(progress::bar(count as u64, "Applying"));
    }

    fn on_resource_start(&mut self, _id: &str, description: &str) {
        if let Some(pb) = &self.pb {
            pb.set_message(description.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        let Some(pb) = &self.pb else {
            return;
        };

        match result {
            ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => {
                pb.println(format!("    {} {}", "✓".green(), id));
            }
            ApplyResult::Failed { error } => {
                pb.println(format!("    {} {}: {}", "✗".red(), id, error));
            }
            ApplyResult::NoChange | ApplyResult::Skipped { .. } => {}
        }
        pb.inc(1);
    }

    fn on_batch_complete(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Interactive confirmation
struct Prompt;

impl ConfirmCallback for Prompt {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

/// Probe and validate every resource, showing a spinner meanwhile
pub fn probe(plan: &mut ExecutionPlan<Resource>, jobs: usize) -> Result<Vec<Issue>> {
    let pb = progress::spinner(&format!(
        "Probing {} resources...",
        plan.total_resources()
    ));
    let probed = probe_all(&mut plan.resources, jobs);
    pb.finish_and_clear();
    probed?;

    Ok(validate_all(&plan.resources))
}

/// Execute the plan with steward's UI integration
pub fn execute(plan: &mut ExecutionPlan<Resource>, opts: &ExecuteOptions) -> Result<ExecuteSummary> {
    // 1. Probe and validate; nothing is applied if anything is wrong
    let issues = probe(plan, opts.jobs)?;
    if !issues.is_empty() {
        display_issues(&issues);
        if opts.dry_run {
            return Ok(ExecuteSummary {
                skipped: plan.total_resources(),
                issues,
                ..Default::default()
            });
        }
        return Err(declarative::Error::ValidationFailed(issues).into());
    }

    // 2. Display what will change
    let diffs = compute_diffs(&plan.resources);
    display_diff(&diffs);

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ExecuteSummary {
            skipped: diffs.len(),
            no_change: plan.total_resources() - diffs.len(),
            ..Default::default()
        });
    }

    let refresh_only = plan.resources.iter().any(Converge::always_apply);
    if diffs.is_empty() && !refresh_only {
        return Ok(ExecuteSummary {
            no_change: plan.total_resources(),
            ..Default::default()
        });
    }

    // 3. Confirm (unless --yes or there is nothing but refreshes)
    if !diffs.is_empty() && !opts.yes && !Prompt.confirm("Continue?")? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: diffs.len(),
            ..Default::default()
        });
    }

    // 4. Apply in declaration order
    println!();
    println!(
        "  {} Applying {} resources...",
        "→".cyan(),
        plan.total_resources()
    );
    let summary = apply_all(
        &mut plan.resources,
        opts.verbose,
        &mut BarProgress { pb: None },
    );

    print_summary(&summary);
    Ok(summary)
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Configuration applied successfully!",
            "✓".green().bold()
        );
    } else {
        println!(
            "  {} Configuration applied with errors",
            "⚠".yellow().bold()
        );
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
