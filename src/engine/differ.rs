//! Plan rendering

use colored::{ColoredString, Colorize};
use declarative::{Diff, DiffType, Plan, StepStatus, group_by_kind};
use similar::{ChangeTag, TextDiff};

/// Heading shown for a diff kind
fn kind_title(kind: &str) -> &str {
    match kind {
        "tap" => "Packages (brew taps)",
        "formula" => "Packages (brew formulae)",
        "cask" => "Packages (brew casks)",
        "symlink" => "Symlinks",
        "file" => "Files",
        other => other,
    }
}

fn symbol(diff_type: DiffType) -> ColoredString {
    let s = diff_type.symbol().to_string();
    match diff_type {
        DiffType::Add => s.green(),
        DiffType::Remove => s.red(),
        DiffType::Modify => s.yellow(),
        DiffType::None => s.dimmed(),
    }
}

fn is_multiline(diff: &Diff) -> bool {
    [&diff.old, &diff.new]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| s.contains('\n')))
}

/// Single-line description of the transition
fn describe(diff: &Diff) -> String {
    if is_multiline(diff) {
        return match diff.diff_type {
            DiffType::Add => "(new file)".to_string(),
            DiffType::Remove => "(will remove)".to_string(),
            _ => "(content changed)".to_string(),
        };
    }
    match (diff.diff_type, &diff.old, &diff.new) {
        (DiffType::Add, None, Some(new)) => format!("(not present) → {new}"),
        (DiffType::Add, None, None) => "(not present)".to_string(),
        (DiffType::Remove, _, _) => "(will remove)".to_string(),
        _ => diff.transition(),
    }
}

/// Line-level content diff, one prefixed line per change
pub fn text_diff_lines(old: &str, new: &str) -> Vec<(ChangeTag, String)> {
    TextDiff::from_lines(old, new)
        .iter_all_changes()
        .map(|change| (change.tag(), change.value().trim_end_matches('\n').to_string()))
        .collect()
}

fn show_text_diff(old: &str, new: &str) {
    for (tag, line) in text_diff_lines(old, new) {
        match tag {
            ChangeTag::Delete => println!("│       {}", format!("-{line}").red()),
            ChangeTag::Insert => println!("│       {}", format!("+{line}").green()),
            ChangeTag::Equal => println!("│       {}", format!(" {line}").dimmed()),
        }
    }
}

/// Display the pending changes of a plan, grouped by kind
pub fn display_plan(plan: &Plan, verbose: bool) {
    let groups = group_by_kind(plan.diffs());

    if groups.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
    } else {
        println!();
        println!(
            "┌─ {} ─────────────────────────────────────────┐",
            "Plan".bold()
        );
        println!("│");

        for (kind, diffs) in &groups {
            println!("│ {}", kind_title(kind).bold());
            for diff in diffs {
                println!(
                    "│   {} {:<30} {}",
                    symbol(diff.diff_type),
                    diff.name,
                    describe(diff).dimmed()
                );
                if verbose && is_multiline(diff) {
                    show_text_diff(
                        diff.old.as_deref().unwrap_or_default(),
                        diff.new.as_deref().unwrap_or_default(),
                    );
                }
            }
            println!("│");
        }

        let summary = plan.diff_summary();
        println!("├─────────────────────────────────────────────────────┤");
        println!(
            "│ Summary: {} changes ({} add, {} modify, {} remove)",
            summary.total().to_string().bold(),
            summary.additions.to_string().green(),
            summary.modifications.to_string().yellow(),
            summary.removals.to_string().red()
        );
        println!("└─────────────────────────────────────────────────────┘");
    }

    display_unknown(plan);
}

/// Entries whose state could not be determined
fn display_unknown(plan: &Plan) {
    let unknown: Vec<_> = plan.unknown().collect();
    if unknown.is_empty() {
        return;
    }
    println!();
    println!(
        "  {} {} step(s) could not be checked:",
        "⚠".yellow(),
        unknown.len()
    );
    for entry in unknown {
        println!(
            "    {} {}",
            entry.id(),
            entry.error.as_deref().unwrap_or(StepStatus::Unknown.label()).dimmed()
        );
    }
}
