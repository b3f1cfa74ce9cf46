//! Diff and issue display

use colored::Colorize;
use declarative::{DiffSummary, Issue, ResourceDiff, group_by_type};

/// Heading for a resource type
fn type_heading(resource_type: &str) -> &str {
    match resource_type {
        "file" => "Files (ownership and mode)",
        "env" => "Environment variables",
        "remote_file" => "Remote files",
        other => other,
    }
}

/// Display a list of diffs in a user-friendly format
pub fn display_diff(diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let groups = group_by_type(diffs);
    let mut types: Vec<&String> = groups.keys().collect();
    types.sort();

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for resource_type in types {
        println!("│ {}", type_heading(resource_type).bold());

        for diff in &groups[resource_type] {
            println!("│   {} {}", "~".yellow(), diff.description);
            for change in &diff.changes {
                println!("│       {}", change.dimmed());
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} resources, {} changes",
        summary.resources.to_string().bold(),
        summary.changes.to_string().bold()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display validation issues
pub fn display_issues(issues: &[Issue]) {
    if issues.is_empty() {
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Validation Issues".red().bold()
    );
    println!("│");
    for issue in issues {
        println!("│  {} {}", "✗".red(), issue.resource_id.bold());
        println!("│      {}", issue.message);
    }
    println!("│");
    println!("└─────────────────────────────────────────────────────┘");
}
