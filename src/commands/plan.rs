//! `stratum plan`: validate and preview without mutating anything.

use anyhow::Result;
use serde_json::json;

use super::Exit;
use crate::Context;
use crate::cli::{GlobalArgs, PlanArgs};
use crate::engine::Session;
use crate::engine::differ::{display_findings, display_plan};
use crate::ui;

pub fn run(ctx: &Context, global: &GlobalArgs, args: &PlanArgs) -> Result<Exit> {
    let session = Session::open(global, &args.doc)?;
    let report = session.validate()?;

    if report.has_fatal() {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&json!({ "findings": report.findings }))?);
        } else {
            display_findings(&report);
            println!();
            ui::error("Planning stopped by failed preconditions");
        }
        return Ok(Exit::Invalid);
    }

    let snapshot = session.snapshot()?;
    let plan = converge::plan(&session.graph, &snapshot);

    if args.json {
        let out = json!({
            "fingerprint": plan.fingerprint(),
            "summary": plan.summary(),
            "findings": report.findings,
            "plan": plan,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(Exit::Success);
    }

    if report.warnings().next().is_some() && !ctx.quiet {
        display_findings(&report);
    }
    display_plan(&plan, ctx.verbose > 0);
    Ok(Exit::Success)
}
