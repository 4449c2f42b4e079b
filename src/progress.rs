//! Execution progress on the terminal

use colored::Colorize;
use declarative::{ProgressCallback, ResultStatus, RollbackRecord, StepId, StepResult};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the entries of a plan
pub struct BarProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl BarProgress {
    pub fn new(total: usize, verbose: bool) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar, verbose }
    }

    /// Bar that draws nothing, for `--quiet`
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose: false,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_step_start(&mut self, id: &StepId) {
        self.bar.set_message(id.to_string());
    }

    fn on_step_complete(&mut self, result: &StepResult) {
        self.bar.inc(1);
        let line = match result.status {
            ResultStatus::Applied => Some(format!("{} {}", "✓".green(), result.id)),
            ResultStatus::Failed => Some(format!(
                "{} {}: {}",
                "✗".red(),
                result.id,
                result.error.as_deref().unwrap_or("failed")
            )),
            ResultStatus::Skipped | ResultStatus::Unknown if self.verbose => Some(format!(
                "{} {} ({})",
                "-".dimmed(),
                result.id,
                result.error.as_deref().unwrap_or(result.status.label())
            )),
            _ => None,
        };
        if let Some(line) = line {
            self.bar.println(line);
        }
    }

    fn on_rollback(&mut self, record: &RollbackRecord) {
        self.bar.set_message(format!("rolling back {}", record.id));
    }
}
