//! `gossip strategies`: list every strategy and what it filters.

use anyhow::Result;
use gossip_sim::Strategy;
use serde::Serialize;

use crate::output::{OutputMode, pretty_section, print_json};

#[derive(Debug, Serialize)]
struct StrategyOutput {
    name: &'static str,
    rule: String,
    token_gated: bool,
    excludes_believed_complete: bool,
    excludes_permanent_peers: bool,
    excludes_known_owners: bool,
    assigns_targets: bool,
}

fn describe(strategy: Strategy) -> StrategyOutput {
    let traits = strategy.descriptor();
    StrategyOutput {
        name: traits.name,
        rule: format!("{:?}", traits.rule),
        token_gated: traits.is_token_gated(),
        excludes_believed_complete: traits.excludes_believed_complete,
        excludes_permanent_peers: traits.excludes_permanent_peers,
        excludes_known_owners: traits.excludes_known_owners,
        assigns_targets: traits.assigns_targets,
    }
}

fn flags(out: &StrategyOutput) -> String {
    let mut parts = Vec::new();
    if out.token_gated {
        parts.push("token");
    }
    if out.excludes_believed_complete {
        parts.push("skip-complete");
    }
    if out.excludes_permanent_peers {
        parts.push("once");
    }
    if out.excludes_known_owners {
        parts.push("new-secrets");
    }
    if out.assigns_targets {
        parts.push("targets");
    }
    parts.join(",")
}

/// Execute `gossip strategies`.
pub fn run_strategies(output: OutputMode) -> Result<()> {
    let rows: Vec<StrategyOutput> = Strategy::ALL.into_iter().map(describe).collect();

    match output {
        OutputMode::Json => print_json(&rows)?,
        OutputMode::Text => {
            for row in &rows {
                println!("strategy name={} rule={} flags={}", row.name, row.rule, flags(row));
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, "Strategies")?;
            for row in &rows {
                println!("{:<20} {:<14} {}", row.name, row.rule, flags(row));
            }
        }
    }
    Ok(())
}
