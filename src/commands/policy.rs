//! `keel policy`

use anyhow::{Result, bail};

use super::{open_session, print_findings};
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    ui::header("Policy");

    let session = open_session(ctx)?;
    let findings = session.findings()?;
    if findings.policy.is_none() && findings.org.is_none() {
        ui::info("No policy configured");
        return Ok(());
    }

    print_findings(&findings);
    println!();
    if findings.is_blocking() {
        bail!("Configuration violates policy");
    }
    if findings.is_empty() {
        ui::success("Configuration complies with policy");
    } else {
        ui::warn("Findings are not blocking; apply may proceed");
    }
    Ok(())
}
