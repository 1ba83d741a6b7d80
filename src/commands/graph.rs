use anyhow::Result;
use colored::Colorize;
use converge::{DependencyGraph, Stack};
use std::collections::HashSet;

use super::Session;
use crate::Context;
use crate::cli::GraphArgs;
use crate::stack;
use crate::ui;

/// Stand-in used when the configured key file cannot be read; only the
/// shape of the graph matters here
const PLACEHOLDER_KEY: &str = "ssh-ed25519 AAAA nimbus-graph";

pub fn run(ctx: &Context, args: &GraphArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let config = &session.config;
    let key = config.read_ssh_key().unwrap_or_else(|e| {
        log::info!("Using a placeholder SSH key: {e:#}");
        PLACEHOLDER_KEY.to_string()
    });
    let stack = stack::declare(config, &key)?;
    let (_, graph) = stack.prepare()?;

    if args.dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    let recorded: HashSet<_> = session.records()?.into_iter().map(|r| r.key).collect();
    print_order(&stack, &graph, &recorded);
    Ok(())
}

fn print_order(
    stack: &Stack,
    graph: &DependencyGraph,
    recorded: &HashSet<converge::ResourceKey>,
) {
    ui::header(&format!("Stack {} ({} resources)", stack.name(), graph.len()));
    for (step, &i) in graph.order().iter().enumerate() {
        let key = graph.key(i);
        let marker = if recorded.contains(key) {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!("{:>3}. {marker} {}", step + 1, ui::resource(key));
        for &p in graph.producers(i) {
            println!("        {} {}", "needs".dimmed(), ui::resource(graph.key(p)));
        }
    }

    if !stack.exports().is_empty() {
        ui::section("Exports");
        for (name, _) in stack.exports() {
            println!("  {name}");
        }
    }
}
