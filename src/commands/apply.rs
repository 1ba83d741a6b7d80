use anyhow::Result;
use converge::CancellationToken;
use std::process::ExitCode;

use super::{Session, exit_code, print_json, print_report};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::TerminalProgress;
use crate::stack;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<ExitCode> {
    let session = Session::open(ctx)?;
    let config = &session.config;
    let ssh_key = config.read_ssh_key()?;
    let stack = stack::declare(config, &ssh_key)?;
    let engine = session.engine(args.jobs, args.no_prune)?;

    if !ctx.quiet && !args.json {
        ui::header(&format!("Applying stack {}", stack.name()));
        ui::kv("Resources", &stack.len().to_string());
        ui::kv("Location", &config.location);
        ui::kv("State", &session.store.path().display().to_string());
        println!();
    }

    let mut progress = TerminalProgress::new(ctx.quiet || args.json);
    let result = engine.apply(&stack, &mut progress, &CancellationToken::new());
    // Resources created before an error must not be forgotten by the next run
    session.save_cloud()?;
    let report = result?;

    if args.json {
        print_json(&report)?;
    } else if !ctx.quiet || !report.is_success() {
        print_report(ctx, &report);
    }
    Ok(exit_code(&report))
}
