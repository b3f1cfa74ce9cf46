//! Declarative commands
//!
//! - `apply` - Make current state match the manifest
//! - `diff` - Preview what apply would change
//! - `validate` - Report everything that would stop apply

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{ExecutionPlan, compute_diffs};
use std::path::{Path, PathBuf};

use crate::Context;
use crate::config::{Backends, Manifest};
use crate::engine::{self, ExecuteOptions};
use crate::engine::differ::{display_diff, display_issues};
use crate::paths;
use crate::resource::Resource;
use crate::ui;

/// Manifest given on the command line, or the default one
fn manifest_path(manifest: Option<&Path>) -> Result<PathBuf> {
    match manifest {
        Some(path) => Ok(path.to_path_buf()),
        None => paths::manifest_file(),
    }
}

/// Load the manifest and turn it into resources
fn load_plan(manifest: Option<&Path>, target: Option<&str>) -> Result<ExecutionPlan<Resource>> {
    let path = manifest_path(manifest)?;
    let manifest = Manifest::load(&path)?;
    let backends = Backends::system().context("Failed to set up system backends")?;

    let plan = manifest.into_plan(&backends)?.filter_by_target(target);
    log::info!(
        "{} resources from {}",
        plan.total_resources(),
        path.display()
    );
    Ok(plan)
}

pub fn apply(
    ctx: &Context,
    manifest: Option<&Path>,
    target: Option<&str>,
    opts: &ExecuteOptions,
) -> Result<()> {
    let mut plan = load_plan(manifest, target)?;
    if plan.is_empty() {
        ui::info("Nothing to apply");
        return Ok(());
    }

    if !ctx.quiet {
        ui::header("Applying configuration");
    }

    let summary = engine::execute(&mut plan, opts)?;
    if !summary.issues.is_empty() {
        anyhow::bail!("{} validation issues found", summary.issues.len());
    }
    if !summary.is_success() {
        anyhow::bail!("{} resources failed to apply", summary.failed);
    }
    Ok(())
}

pub fn diff(ctx: &Context, manifest: Option<&Path>, target: Option<&str>, jobs: usize) -> Result<()> {
    let mut plan = load_plan(manifest, target)?;

    if !ctx.quiet {
        ui::header("Configuration diff");
    }

    let issues = engine::probe(&mut plan, jobs)?;
    display_issues(&issues);
    display_diff(&compute_diffs(&plan.resources));
    Ok(())
}

pub fn validate(ctx: &Context, manifest: Option<&Path>, jobs: usize) -> Result<()> {
    let mut plan = load_plan(manifest, None)?;
    let issues = engine::probe(&mut plan, jobs)?;

    if issues.is_empty() {
        if !ctx.quiet {
            println!(
                "  {} {} resources valid",
                "✓".green(),
                plan.total_resources()
            );
        }
        return Ok(());
    }

    display_issues(&issues);
    Err(declarative::Error::ValidationFailed(issues).into())
}
