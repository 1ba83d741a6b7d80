//! Subcommand implementations and the session they share

pub mod apply;
pub mod destroy;
pub mod graph;
pub mod state;

use anyhow::{Context as _, Result, bail};
use azurekit::SimulatedCloud;
use colored::Colorize;
use converge::{Engine, ReconciliationRecord, ResourceKey, RunReport, StateStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crate::Context;
use crate::config::NimbusConfig;
use crate::paths;
use crate::state::{FileStateStore, load_cloud, save_cloud};
use crate::ui;

/// Engine wired to the on-disk state and simulated cloud of one stack
pub type StackEngine = Engine<Arc<SimulatedCloud>, Arc<FileStateStore>>;

/// Config, state store and cloud for one invocation
pub struct Session {
    pub config: NimbusConfig,
    pub store: Arc<FileStateStore>,
    pub cloud: Arc<SimulatedCloud>,
    cloud_path: PathBuf,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let config = NimbusConfig::load(ctx.config.as_deref())?;
        let state_path = paths::state_file(&config.stack)?;
        let cloud_path = paths::cloud_file(&config.stack)?;
        log::debug!("State file: {}", state_path.display());

        let store = FileStateStore::open(state_path, &config.stack)?;
        let cloud = load_cloud(&cloud_path, &config.subscription)?
            .with_latency(Duration::from_millis(config.engine.simulated_latency_ms));

        Ok(Self {
            config,
            store: Arc::new(store),
            cloud: Arc::new(cloud),
            cloud_path,
        })
    }

    /// Build an engine from the config, with command-line overrides
    pub fn engine(&self, jobs: Option<usize>, no_prune: bool) -> Result<StackEngine> {
        let mut options = self.config.engine.options();
        if let Some(jobs) = jobs {
            if jobs == 0 {
                bail!("--jobs must be at least 1");
            }
            options.concurrency_limit = jobs;
        }
        if no_prune {
            options.prune = false;
        }
        Ok(Engine::new(Arc::clone(&self.cloud), Arc::clone(&self.store)).with_options(options))
    }

    pub fn records(&self) -> Result<Vec<ReconciliationRecord>> {
        self.store.records()
    }

    pub fn save_cloud(&self) -> Result<()> {
        save_cloud(&self.cloud_path, &self.cloud)
    }
}

/// Find a recorded resource by `kind::name` or by a name that is unique
/// among the records
pub fn resolve_target(records: &[ReconciliationRecord], target: &str) -> Result<ResourceKey> {
    if target.contains("::") {
        let key: ResourceKey = target
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("Invalid resource '{target}'"))?;
        if !records.iter().any(|r| r.key == key) {
            bail!("No recorded resource '{key}'");
        }
        return Ok(key);
    }

    let matches: Vec<&ResourceKey> = records
        .iter()
        .map(|r| &r.key)
        .filter(|k| k.name == target)
        .collect();
    match matches.as_slice() {
        [] => bail!("No recorded resource named '{target}'"),
        [key] => Ok((*key).clone()),
        keys => {
            let listed: Vec<String> = keys.iter().map(ToString::to_string).collect();
            bail!(
                "Name '{target}' is ambiguous, use kind::name: {}",
                listed.join(", ")
            )
        }
    }
}

/// Process exit status matching the report
pub fn exit_code(report: &RunReport) -> ExitCode {
    u8::try_from(report.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}

/// Print the report as pretty JSON
pub fn print_json(report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}

/// Human-readable summary of a run
pub fn print_report(ctx: &Context, report: &RunReport) {
    let summary = report.summary();

    if ctx.verbose > 0 {
        for (key, outcome) in &report.outcomes {
            println!("  {} {}", ui::resource(key), ui::outcome(*outcome));
        }
    }

    if !report.failed.is_empty() || !report.delete_failed.is_empty() {
        ui::section("Failures");
        for failure in report.failed.iter().chain(&report.delete_failed) {
            println!("  {} {} {}", "✗".red(), ui::resource(&failure.key), failure.error);
        }
    }

    if !report.skipped.is_empty() || !report.delete_skipped.is_empty() {
        ui::section("Skipped");
        for skipped in report.skipped.iter().chain(&report.delete_skipped) {
            println!(
                "  {} {} {}",
                "-".yellow(),
                ui::resource(&skipped.key),
                format!("blocked by {}", skipped.blocked_by).dimmed()
            );
        }
    }

    if !report.pending.is_empty() {
        ui::section("Not started");
        for key in &report.pending {
            println!("  {} {}", "·".dimmed(), ui::resource(key));
        }
    }

    if !report.exports.is_empty() || !report.missing_exports.is_empty() {
        ui::section("Outputs");
        for (name, value) in &report.exports {
            let shown = value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_string);
            ui::kv(name, &shown);
        }
        for (name, reason) in &report.missing_exports {
            ui::kv(name, &format!("{} ({reason})", "unavailable".yellow()));
        }
    }

    println!();
    let counts = format!(
        "{} created, {} updated, {} unchanged, {} deleted, {} failed, {} skipped",
        summary.created,
        summary.updated,
        summary.unchanged,
        summary.deleted,
        summary.failed,
        summary.skipped
    );
    if report.is_success() && summary.total_changes() == 0 {
        ui::success(&format!("No changes, {} resource(s) up to date", summary.total()));
    } else if report.is_success() {
        ui::success(&counts);
    } else if report.cancelled {
        ui::warn(&format!("Cancelled: {counts}, {} not started", summary.pending));
    } else if report.is_partial() {
        ui::warn(&format!("Partially applied: {counts}"));
    } else {
        ui::error(&format!("Failed: {counts}"));
    }
}
