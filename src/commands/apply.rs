//! `stratum apply`: plan, confirm and converge.

use anyhow::Result;
use converge::CancelToken;

use super::Exit;
use crate::Context;
use crate::cli::{ApplyArgs, GlobalArgs};
use crate::engine::differ::{display_findings, display_plan};
use crate::engine::{CliConfirm, CliProgress, Session, print_report};
use crate::{sigint, ui};

pub fn run(ctx: &Context, global: &GlobalArgs, args: &ApplyArgs) -> Result<Exit> {
    let session = Session::open(global, &args.doc)?;

    let findings = session.validate()?;
    if findings.has_fatal() {
        display_findings(&findings);
        println!();
        ui::error("Apply stopped by failed preconditions; nothing was changed");
        return Ok(Exit::Invalid);
    }
    if findings.warnings().next().is_some() && !ctx.quiet {
        display_findings(&findings);
    }

    let snapshot = session.snapshot()?;
    let plan = converge::plan(&session.graph, &snapshot);
    display_plan(&plan, ctx.verbose > 0);

    if let Some(expected) = &args.expect_fingerprint {
        let actual = plan.fingerprint();
        if !actual.eq_ignore_ascii_case(expected) {
            ui::error(&format!(
                "Plan fingerprint {actual} does not match the expected {expected}"
            ));
            ui::hint("The live state or the documents changed since the preview; re-run plan");
            return Ok(Exit::Declined);
        }
    }

    let cancel = CancelToken::new();
    sigint::install(&cancel);
    let opts = session.execute_options(args.allow_destructive, cancel);

    let mut progress = CliProgress::new(ctx.quiet);
    let mut confirm = CliConfirm::new(args.auto_approve);
    let report = converge::execute(&plan, session.backend(), &opts, &mut progress, &mut confirm)?;

    print_report(&report);
    Ok(Exit::from(report.outcome))
}
