//! Terminal integration for the reconciler: prompts, progress and summary

use anyhow::Result;
use colored::Colorize;
use converge::{
    ApplyOutcome, ApplyReport, ConfirmCallback, PlanKind, PlanStep, ProgressCallback, StepResult,
};
use indicatif::ProgressBar;

use super::differ::display_destructive_boundary;
use crate::progress;
use crate::ui;

/// Confirmation through dialoguer; declines when nobody is at the terminal
pub struct CliConfirm {
    auto_approve: bool,
    attended: bool,
}

impl CliConfirm {
    pub fn new(auto_approve: bool) -> Self {
        Self {
            auto_approve,
            attended: console::user_attended(),
        }
    }
}

impl ConfirmCallback for CliConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.auto_approve {
            return Ok(true);
        }
        if !self.attended {
            log::warn!("Not running interactively; declining (pass --auto-approve)");
            return Ok(false);
        }

        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;

        Ok(confirmed)
    }

    fn confirm_destructive(&mut self, steps: &[&PlanStep]) -> Result<bool> {
        display_destructive_boundary(steps);
        self.confirm("Proceed with the destructive changes?")
    }
}

/// Progress bar over the steps that call the backend
pub struct CliProgress {
    pb: Option<ProgressBar>,
    quiet: bool,
}

impl CliProgress {
    pub fn new(quiet: bool) -> Self {
        Self { pb: None, quiet }
    }
}

impl ProgressCallback for CliProgress {
    fn on_start(&mut self, changes: usize) {
        self.pb = Some(progress::bar(changes as u64, self.quiet));
    }

    fn on_step_start(&mut self, step: &PlanStep) {
        if let Some(pb) = &self.pb {
            pb.set_message(format!(
                "{} {}",
                step.action,
                ui::truncate_start(&step.key.to_string(), 40)
            ));
        }
    }

    fn on_step_complete(&mut self, step: &PlanStep, result: &StepResult) {
        let Some(pb) = &self.pb else {
            return;
        };
        if !step.action.is_change() {
            return;
        }
        match result {
            StepResult::Succeeded => {}
            StepResult::Failed { error } => {
                pb.println(format!("  {} {} {}: {}", "✗".red(), step.action, step.key, error));
            }
            StepResult::Skipped { reason } => {
                pb.println(format!("  {} {} ({})", "⊘".dimmed(), step.key, reason.dimmed()));
            }
        }
        pb.inc(1);
    }

    fn on_finish(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Print final summary
pub fn print_report(report: &ApplyReport) {
    let noun = match report.kind {
        PlanKind::Apply => "Apply",
        PlanKind::Destroy => "Teardown",
    };
    let summary = &report.summary;

    println!();
    match report.outcome {
        ApplyOutcome::NoChanges => {
            println!("  {} Nothing to do", "✓".green().bold());
            return;
        }
        ApplyOutcome::Succeeded => println!("  {} {noun} complete", "✓".green().bold()),
        ApplyOutcome::PartialFailure => {
            println!("  {} {noun} finished with errors", "⚠".yellow().bold());
        }
        ApplyOutcome::Cancelled => println!("  {} {noun} cancelled", "⊘".yellow().bold()),
        ApplyOutcome::Declined => {
            println!("  {} Aborted, no changes made", "✗".red());
            return;
        }
    }

    if summary.created > 0 {
        println!("    • {} created", ui::plural(summary.created, "resource"));
    }
    if summary.updated > 0 {
        println!("    • {} updated", ui::plural(summary.updated, "resource"));
    }
    if summary.replaced > 0 {
        println!("    • {} replaced", ui::plural(summary.replaced, "resource"));
    }
    if summary.deleted > 0 {
        println!("    • {} deleted", ui::plural(summary.deleted, "resource"));
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", ui::plural(summary.skipped, "resource"));
    }
    if summary.failed > 0 {
        println!(
            "    • {} {}",
            ui::plural(summary.failed, "resource"),
            "failed".red()
        );
        for step in report.failed() {
            if let StepResult::Failed { error } = &step.result {
                println!("        {} {}: {}", step.action, step.key, error.dimmed());
            }
        }
    }

    if matches!(
        report.outcome,
        ApplyOutcome::PartialFailure | ApplyOutcome::Cancelled
    ) {
        ui::dim("Fix the cause and re-run; completed steps will not be repeated.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_approve_never_prompts() {
        let mut confirm = CliConfirm {
            auto_approve: true,
            attended: false,
        };
        assert!(confirm.confirm("Apply?").unwrap());
    }

    #[test]
    fn test_unattended_without_approval_declines() {
        let mut confirm = CliConfirm {
            auto_approve: false,
            attended: false,
        };
        assert!(!confirm.confirm("Apply?").unwrap());
        assert!(!confirm.confirm_destructive(&[]).unwrap());
    }

    #[test]
    fn test_quiet_progress_is_hidden() {
        let mut progress = CliProgress::new(true);
        progress.on_start(2);
        assert!(progress.pb.as_ref().is_some_and(ProgressBar::is_hidden));
        progress.on_finish();
        assert!(progress.pb.is_none());
    }
}
