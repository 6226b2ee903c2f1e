//! `stratum destroy`: remove declared resources in reverse dependency order.

use anyhow::Result;
use cloudkit::ResourceKey;
use converge::{CancelToken, TeardownMode, TeardownOptions, plan_teardown};

use super::Exit;
use crate::Context;
use crate::cli::{DestroyArgs, GlobalArgs};
use crate::engine::differ::display_plan;
use crate::engine::{CliConfirm, CliProgress, Session, print_report};
use crate::{sigint, ui};

pub fn run(ctx: &Context, global: &GlobalArgs, args: &DestroyArgs) -> Result<Exit> {
    let mut targets = Vec::with_capacity(args.targets.len());
    for raw in &args.targets {
        match raw.parse::<ResourceKey>() {
            Ok(key) => targets.push(key),
            Err(e) => {
                ui::error(&e);
                return Ok(Exit::Invalid);
            }
        }
    }

    let session = Session::open(global, &args.doc)?;
    let options = TeardownOptions {
        mode: if args.purge {
            TeardownMode::Purge
        } else {
            TeardownMode::SoftRemove
        },
        confirm_purge: args.confirm_purge,
        targets,
    };

    let snapshot = session.snapshot()?;
    let plan = plan_teardown(&session.graph, &snapshot, &options)?;
    display_plan(&plan, ctx.verbose > 0);

    let cancel = CancelToken::new();
    sigint::install(&cancel);
    let opts = session.execute_options(false, cancel);

    let mut progress = CliProgress::new(ctx.quiet);
    let mut confirm = CliConfirm::new(args.auto_approve);
    let report = converge::execute(&plan, session.backend(), &opts, &mut progress, &mut confirm)?;

    print_report(&report);
    Ok(Exit::from(report.outcome))
}
