//! `keel lock status` / `keel lock update`

use anyhow::Result;
use colored::Colorize;

use super::open_session;
use crate::Context;
use crate::cli::LockCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: &LockCommand) -> Result<()> {
    match cmd {
        LockCommand::Status => status(ctx),
        LockCommand::Update => update(ctx),
    }
}

fn status(ctx: &Context) -> Result<()> {
    ui::header("Lockfile");

    let session = open_session(ctx)?;
    ui::kv("Path", &session.lock_path().display().to_string());

    let Some(lockfile) = session.lockfile() else {
        ui::info("No lockfile yet; run `keel lock update` or `keel apply` to create one");
        return Ok(());
    };

    ui::kv("Recorded mode", lockfile.mode.as_str());
    ui::kv(
        "Machine",
        &format!(
            "{} ({}/{})",
            lockfile.machine.hostname, lockfile.machine.os, lockfile.machine.arch
        ),
    );

    ui::section(&format!("Packages ({})", lockfile.len()));
    for (key, entry) in &lockfile.packages {
        println!(
            "  {:<40} {} {}",
            key,
            entry.version,
            entry.locked_at.format("%Y-%m-%d").to_string().dimmed()
        );
    }

    let drift = session.drift();
    if drift.is_empty() {
        println!();
        ui::success("No drift");
    } else {
        ui::section("Drift");
        for d in &drift {
            println!(
                "  {} {:<38} {} → {}",
                "~".yellow(),
                d.key,
                d.locked,
                d.available.as_deref().unwrap_or("?")
            );
        }
    }

    let tampered = lockkit::integrity::tampered(lockfile);
    if !tampered.is_empty() {
        ui::section("Integrity");
        for key in tampered {
            println!("  {} {key} (hash does not match; rewritten on next update)", "!".red());
        }
    }

    let unlocked: Vec<_> = session
        .resolutions()
        .into_iter()
        .filter(|r| r.resolution.updated)
        .collect();
    if !unlocked.is_empty() {
        ui::section("Not yet locked");
        for record in unlocked {
            println!("  {} {}", "+".green(), record.key());
        }
    }
    Ok(())
}

fn update(ctx: &Context) -> Result<()> {
    ui::header("Updating Lockfile");

    let session = open_session(ctx)?;
    let plan = session.plan()?;
    let update = session.update_lock(&plan, None)?;

    for key in &update.added {
        println!("  {} {key}", "+".green());
    }
    for key in &update.updated {
        println!("  {} {key}", "~".yellow());
    }
    for key in &update.removed {
        println!("  {} {key}", "-".red());
    }

    if update.has_changes() {
        ui::success(&format!("Wrote {}", session.lock_path().display()));
    } else {
        ui::success("Lockfile already up to date");
    }
    Ok(())
}
