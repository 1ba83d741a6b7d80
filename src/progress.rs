//! Terminal progress for provisioning runs.

use crate::ui;
use colored::Colorize;
use converge::{NodeError, NodeOutcome, ProgressCallback, ProviderError, ResourceKey, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar with one printed line per finished resource
pub struct TerminalProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl TerminalProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar
        };
        Self { bar, quiet }
    }

    fn line(&self, text: String) {
        if !self.quiet {
            self.bar.println(text);
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn on_node_start(&mut self, key: &ResourceKey) {
        self.bar.set_message(format!("{key}"));
    }

    fn on_node_complete(&mut self, key: &ResourceKey, result: &Result<NodeOutcome, NodeError>) {
        self.bar.inc(1);
        match result {
            Ok(outcome) => self.line(format!(
                "  {} {} {}",
                "✓".green(),
                ui::resource(key),
                ui::outcome(*outcome)
            )),
            Err(error) => self.line(format!(
                "  {} {} {}",
                "✗".red(),
                ui::resource(key),
                error.to_string().red()
            )),
        }
    }

    fn on_node_skipped(&mut self, key: &ResourceKey, blocked_by: &ResourceKey) {
        self.bar.inc(1);
        self.line(format!(
            "  {} {} {}",
            "-".yellow(),
            ui::resource(key),
            format!("skipped, {blocked_by} failed").dimmed()
        ));
    }

    fn on_retry(&mut self, key: &ResourceKey, attempt: u32, error: &ProviderError, delay: Duration) {
        self.line(format!(
            "  {} {} attempt {attempt} failed ({error}), retrying in {:.1}s",
            "↻".yellow(),
            ui::resource(key),
            delay.as_secs_f64()
        ));
    }

    fn on_run_complete(&mut self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }
}
