//! `keel explain <step-id>`

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use declarative::{ExplainContext, StepId};

use super::open_session;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, step: &str) -> Result<()> {
    let id = StepId::new(step).with_context(|| format!("Invalid step ID '{step}'"))?;
    let session = open_session(ctx)?;
    let Some(found) = session.graph.get(&id) else {
        bail!("No step {id} in the configuration");
    };

    let explanation = found.explain(&ExplainContext {
        verbose: ctx.verbose > 0,
    });

    ui::header(id.as_str());
    println!("{}", explanation.summary);
    if !explanation.detail.is_empty() {
        println!();
        println!("{}", explanation.detail);
    }

    let deps = session.graph.dependencies_of(&id);
    if !deps.is_empty() {
        ui::section("Depends on");
        for dep in deps {
            println!("  • {dep}");
        }
    }
    let dependents = session.graph.dependents_of(&id);
    if !dependents.is_empty() {
        ui::section("Required by");
        for dep in dependents {
            println!("  • {dep}");
        }
    }

    if !explanation.tradeoffs.is_empty() {
        ui::section("Tradeoffs");
        for tradeoff in &explanation.tradeoffs {
            println!("  • {tradeoff}");
        }
    }
    if !explanation.doc_links.is_empty() {
        ui::section("Docs");
        for link in &explanation.doc_links {
            println!("  {}", link.underline());
        }
    }
    Ok(())
}
