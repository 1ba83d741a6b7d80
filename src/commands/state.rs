use anyhow::{Context as _, Result};
use colored::Colorize;

use super::{Session, resolve_target};
use crate::Context;
use crate::ui;

pub fn list(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let records = session.records()?;

    ui::header(&format!("State of stack {}", session.config.stack));
    ui::kv("File", &session.store.path().display().to_string());
    if records.is_empty() {
        ui::dim("No recorded resources");
        return Ok(());
    }

    println!();
    for record in &records {
        println!(
            "  {} {}",
            ui::resource(&record.key),
            record
                .updated_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .dimmed()
        );
        if ctx.verbose > 0 {
            ui::dim(&record.remote_id);
        }
    }
    println!();
    ui::info(&format!("{} resource(s)", records.len()));
    Ok(())
}

pub fn show(ctx: &Context, target: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let records = session.records()?;
    let key = resolve_target(&records, target)?;
    let Some(record) = records.into_iter().find(|r| r.key == key) else {
        anyhow::bail!("No recorded resource '{key}'");
    };
    let json = serde_json::to_string_pretty(&record).context("Failed to serialize record")?;
    println!("{json}");
    Ok(())
}
