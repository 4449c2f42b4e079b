//! `keel apply`

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use declarative::{ExecuteError, ExecutionReport, Executor, ResultStatus, RollbackOutcome};
use dialoguer::Confirm;

use super::{open_session, print_findings};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::differ;
use crate::progress::BarProgress;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    ui::header("Applying Configuration");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let session = open_session(ctx)?;
    let plan = session.plan()?;
    differ::display_plan(&plan, ctx.verbose > 0);

    let findings = session.findings()?;
    print_findings(&findings);
    if findings.is_blocking() {
        if args.ignore_policy {
            ui::warn("Policy violations ignored (--ignore-policy)");
        } else {
            bail!(
                "Refusing to apply: configuration violates policy (use --ignore-policy to override)"
            );
        }
    }

    let pending = plan.summary().needs_apply;
    if pending > 0 && !args.yes && !args.dry_run {
        println!();
        let confirmed = Confirm::new()
            .with_prompt(format!("Apply {}?", ui::plural(pending, "step")))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::info("Nothing applied");
            return Ok(());
        }
    }

    let executor = Executor::new()
        .with_dry_run(args.dry_run)
        .with_rollback_on_failure(args.rollback)
        .with_jobs(args.jobs);

    let mut progress = if ctx.quiet {
        BarProgress::hidden()
    } else {
        BarProgress::new(plan.len(), ctx.verbose > 0)
    };
    let outcome = executor.execute(&plan, &session.ctx, &mut progress);
    progress.finish();

    let report = match outcome {
        Ok(report) => report,
        Err(ExecuteError::Cancelled(report)) => {
            print_report(&report, args.dry_run);
            bail!(
                "Cancelled after {}; lockfile not updated",
                ui::plural(report.results.len(), "step")
            );
        }
        Err(e) => return Err(e.into()),
    };

    print_report(&report, args.dry_run);

    if report.has_failures() {
        if report.was_rolled_back() {
            bail!("Apply failed and was rolled back; lockfile not updated");
        }
        bail!(
            "{} failed; lockfile not updated",
            ui::plural(report.count(ResultStatus::Failed), "step")
        );
    }

    if !args.dry_run {
        let update = session.update_lock(&plan, Some(&report))?;
        if update.has_changes() {
            ui::info(&format!(
                "Lockfile {} updated ({} added, {} updated, {} removed)",
                session.lock_path().display(),
                update.added.len(),
                update.updated.len(),
                update.removed.len()
            ));
        }
        ui::success("Apply complete!");
    }
    Ok(())
}

fn print_report(report: &ExecutionReport, dry_run: bool) {
    println!();
    if dry_run {
        for result in report
            .results
            .iter()
            .filter(|r| r.status == ResultStatus::DryRun)
        {
            println!("  {} {}", "→".cyan(), result.id);
        }
    }

    let mut counts = vec![
        format!("{} applied", report.count(ResultStatus::Applied)),
        format!("{} satisfied", report.count(ResultStatus::Satisfied)),
    ];
    if dry_run {
        counts.push(format!("{} would apply", report.count(ResultStatus::DryRun)));
    }
    for (status, label) in [
        (ResultStatus::Failed, "failed"),
        (ResultStatus::Skipped, "skipped"),
        (ResultStatus::Unknown, "unknown"),
    ] {
        let n = report.count(status);
        if n > 0 {
            counts.push(format!("{n} {label}"));
        }
    }
    ui::kv("Result", &counts.join(", "));

    for failed in report.failed() {
        ui::error(&format!(
            "{}: {}",
            failed.id,
            failed.error.as_deref().unwrap_or("failed")
        ));
    }

    if report.was_rolled_back() {
        ui::section("Rollback");
        for record in &report.rollback {
            match &record.outcome {
                RollbackOutcome::RolledBack => println!("  {} {}", "↺".yellow(), record.id),
                RollbackOutcome::NotRevertible => {
                    println!("  {} {} (not revertible)", "⚠".yellow(), record.id);
                }
                RollbackOutcome::Error(e) => println!("  {} {}: {e}", "✗".red(), record.id),
            }
        }
    }
}
