//! `stratum validate`: precondition checks only.

use anyhow::Result;

use super::Exit;
use crate::Context;
use crate::cli::{DocumentArgs, GlobalArgs};
use crate::engine::Session;
use crate::engine::differ::display_findings;
use crate::ui;

pub fn run(ctx: &Context, global: &GlobalArgs, args: &DocumentArgs) -> Result<Exit> {
    let session = Session::open(global, args)?;
    let report = session.validate()?;

    if !ctx.quiet || report.has_fatal() {
        ui::header(&format!(
            "Preconditions ({})",
            ui::plural(session.graph.len(), "resource")
        ));
        display_findings(&report);
    }

    if report.has_fatal() {
        println!();
        ui::error(&format!(
            "{} failed",
            ui::plural(report.fatal().count(), "check")
        ));
        return Ok(Exit::Invalid);
    }

    let warnings = report.warnings().count();
    if warnings > 0 && !ctx.quiet {
        println!();
        ui::warn(&format!("{} to review", ui::plural(warnings, "warning")));
    }
    Ok(Exit::Success)
}
