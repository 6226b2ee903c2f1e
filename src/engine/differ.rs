//! Plan and finding display

use cloudkit::Value;
use colored::{ColoredString, Colorize};
use converge::{Action, FieldChange, Plan, PlanKind, PlanStep, Severity, ValidationReport};

const RULE: &str = "─────────────────────────────────────────────────────";

fn symbol(action: Action) -> ColoredString {
    match action {
        Action::Create => "+".green(),
        Action::Update => "~".yellow(),
        Action::Replace => "±".red().bold(),
        Action::Delete => "-".red(),
        Action::NoOp => "○".dimmed(),
    }
}

/// Display a plan; no-op steps are only listed when `verbose`.
pub fn display_plan(plan: &Plan, verbose: bool) {
    let summary = plan.summary();
    if !plan.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let title = match plan.kind {
        PlanKind::Apply => "Plan",
        PlanKind::Destroy => "Teardown Plan",
    };
    println!();
    println!("┌─ {} ─────────────────────────────────────────┐", title.bold());
    println!("│");

    for step in &plan.steps {
        if step.action == Action::NoOp && !verbose {
            continue;
        }
        let marker = if step.destructive {
            format!(" [{}]", destructive_label(step)).red().to_string()
        } else {
            String::new()
        };
        println!(
            "│ {} {:<48} {}{}",
            symbol(step.action),
            step.key.to_string(),
            step.reason.dimmed(),
            marker
        );
        for change in &step.changes {
            display_change(change, verbose);
        }
    }

    println!("│");
    println!("├{RULE}┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to replace, {} to delete",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.replace.to_string().red(),
        summary.delete.to_string().red()
    );
    if summary.destructive > 0 {
        println!(
            "│ {} destructive step(s)",
            summary.destructive.to_string().red().bold()
        );
    }
    println!("│ Fingerprint: {}", plan.fingerprint().cyan());
    println!("└{RULE}┘");
}

fn destructive_label(step: &PlanStep) -> &'static str {
    match (step.action, step.purge) {
        (Action::Delete, true) => "purge",
        (Action::Replace, _) => "replace",
        _ => "destructive",
    }
}

fn display_change(change: &FieldChange, verbose: bool) {
    let immutable = if change.immutable {
        " (immutable)".red().to_string()
    } else {
        String::new()
    };

    if verbose && (is_structured(change.observed.as_ref()) || is_structured(change.declared.as_ref())) {
        println!("│     {}{}", change.field, immutable);
        let old = pretty(change.observed.as_ref());
        let new = pretty(change.declared.as_ref());
        let diff = similar::TextDiff::from_lines(&old, &new);
        for line in diff.iter_all_changes() {
            match line.tag() {
                similar::ChangeTag::Delete => print!("│       {}", format!("- {line}").red()),
                similar::ChangeTag::Insert => print!("│       {}", format!("+ {line}").green()),
                similar::ChangeTag::Equal => print!("│       {}", format!("  {line}").dimmed()),
            }
        }
        return;
    }

    println!(
        "│     {}: {} → {}{}",
        change.field,
        short(change.observed.as_ref()).dimmed(),
        short(change.declared.as_ref()),
        immutable
    );
}

fn is_structured(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::List(_) | Value::Map(_)))
}

fn short(value: Option<&Value>) -> String {
    value.map_or_else(|| "(unset)".to_string(), ToString::to_string)
}

/// Multi-line rendering for line diffs; always newline-terminated.
fn pretty(value: Option<&Value>) -> String {
    let mut text = match value {
        Some(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        None => String::new(),
    };
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Display the boundary in front of destructive steps
pub fn display_destructive_boundary(steps: &[&PlanStep]) {
    if steps.is_empty() {
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Destructive Changes".red().bold()
    );
    println!("│");
    println!(
        "│  {}  The following {} step(s) delete or replace resources:",
        "⚠".yellow(),
        steps.len()
    );
    println!("│");

    for step in steps.iter().take(10) {
        println!("│  • {} {} ({})", step.action, step.key, step.reason);
    }
    if steps.len() > 10 {
        println!("│  • ... and {} more", steps.len() - 10);
    }

    if steps.iter().any(|s| s.purge) {
        println!("│");
        println!("│  {}", "Purged resources cannot be recovered.".red());
    }
    println!("│");
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Display validation findings, fatal ones first
pub fn display_findings(report: &ValidationReport) {
    if report.findings.is_empty() {
        println!("  {} All precondition checks passed", "✓".green());
        return;
    }

    for finding in report.fatal().chain(report.warnings()) {
        let label = match finding.severity {
            Severity::Fatal => "fatal".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
        };
        println!("  {} {}: {}", label, finding.resource.bold(), finding.message);
        println!("    {} {}", "→".cyan(), finding.remediation.dimmed());
    }
}
