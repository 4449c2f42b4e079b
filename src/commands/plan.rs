//! `keel plan`

use anyhow::Result;

use super::{open_session, print_findings};
use crate::Context;
use crate::engine::differ;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    ui::header("Plan");

    let session = open_session(ctx)?;
    let plan = session.plan()?;
    differ::display_plan(&plan, ctx.verbose > 0);
    print_findings(&session.findings()?);

    let summary = plan.summary();
    println!();
    ui::info(&format!(
        "{} to apply, {} satisfied",
        ui::plural(summary.needs_apply, "step"),
        summary.satisfied
    ));
    Ok(())
}
