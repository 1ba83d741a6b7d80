use anyhow::Result;
use converge::{CancellationToken, ConfirmCallback, ResourceKey};
use std::process::ExitCode;

use super::{Session, exit_code, print_json, print_report, resolve_target};
use crate::Context;
use crate::cli::DestroyArgs;
use crate::progress::TerminalProgress;
use crate::ui;

/// Asks on the terminal unless `--yes` was given
struct TerminalConfirm {
    assume_yes: bool,
}

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            log::info!("{prompt} (assumed yes)");
            return Ok(true);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

pub fn run(ctx: &Context, args: &DestroyArgs) -> Result<ExitCode> {
    let session = Session::open(ctx)?;
    let records = session.records()?;
    if records.is_empty() {
        if !args.json {
            ui::info(&format!("Stack {} has no recorded resources", session.config.stack));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let targets = args
        .targets
        .iter()
        .map(|t| resolve_target(&records, t))
        .collect::<Result<Vec<ResourceKey>>>()?;

    let engine = session.engine(args.jobs, false)?;
    let mut progress = TerminalProgress::new(ctx.quiet || args.json);
    let mut confirm = TerminalConfirm {
        assume_yes: args.yes,
    };
    let cancel = CancellationToken::new();

    if !ctx.quiet && !args.json {
        ui::header(&format!("Destroying stack {}", session.config.stack));
    }

    let result = if targets.is_empty() {
        engine.destroy_all(&mut progress, &mut confirm, &cancel)
    } else {
        engine.destroy(&targets, &mut progress, &mut confirm, &cancel)
    };
    session.save_cloud()?;
    let report = result?;

    if args.json {
        print_json(&report)?;
    } else if report.cancelled && report.deleted.is_empty() && report.delete_failed.is_empty() {
        ui::warn("Nothing was deleted");
    } else if !ctx.quiet || !report.is_success() {
        print_report(ctx, &report);
    }
    Ok(exit_code(&report))
}
