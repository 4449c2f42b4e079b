pub mod apply;
pub mod explain;
pub mod lock;
pub mod plan;
pub mod policy;

use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::engine::{Findings, Session, SessionOptions};
use crate::ui;

/// Open a session for the global CLI options
fn open_session(ctx: &Context) -> Result<Session> {
    let session = Session::open(
        SessionOptions {
            config_files: ctx.config.clone(),
            mode: ctx.mode,
            verbose: ctx.verbose > 0,
            cancel: ctx.cancel.clone(),
        },
        ctx.backend.clone(),
    )?;
    if !ctx.quiet {
        let files: Vec<String> = session
            .config
            .files
            .iter()
            .map(|f| f.display().to_string())
            .collect();
        ui::kv("Config", &files.join(", "));
        ui::kv("Mode", session.mode.as_str());
        ui::kv("Steps", &session.graph.len().to_string());
    }
    Ok(session)
}

/// Print policy and org policy results; silent when there is nothing to say
fn print_findings(findings: &Findings) {
    if findings.is_empty() {
        return;
    }

    ui::section("Policy");
    if let Some(report) = &findings.policy {
        for violation in &report.violations {
            let rule = violation
                .pattern
                .as_deref()
                .map(|p| format!(" (deny '{p}')"))
                .unwrap_or_default();
            println!(
                "  {} {}{rule}: {}",
                "✗".red(),
                violation.id,
                violation.reason.dimmed()
            );
        }
    }
    if let Some(report) = &findings.org {
        for finding in &report.violations {
            println!("  {} {finding}", "✗".red());
        }
        for finding in &report.warnings {
            println!("  {} {finding}", "⚠".yellow());
        }
        for overridden in &report.overridden {
            println!(
                "  {} {} (overridden: {})",
                "-".dimmed(),
                overridden.finding,
                overridden.reason.dimmed()
            );
        }
    }
}
