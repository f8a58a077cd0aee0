//! `gossip sweep`: compare strategies across population sizes.

use std::path::PathBuf;
use std::process;

use anyhow::{Result, bail};
use clap::Args;
use gossip_sim::{CallProtocol, CampaignConfig, Strategy, SweepCell, run_sweep};

use crate::output::{
    OutputMode, PRETTY_RULE_WIDTH, append_json_lines, fmt_stat, pretty_kv, pretty_section,
    print_json,
};

/// Arguments for `gossip sweep`.
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Population sizes, comma separated.
    #[arg(short = 'n', long, value_delimiter = ',', default_value = "4,8,16,32")]
    pub agents: Vec<usize>,

    /// Strategies to compare, comma separated. Defaults to all of them.
    #[arg(short, long, value_delimiter = ',')]
    pub strategies: Vec<Strategy>,

    /// Call protocol: `Standard` or `Not-Standard`.
    #[arg(short, long, default_value = "Standard")]
    pub protocol: CallProtocol,

    /// Seeds per cell.
    #[arg(long, default_value = "20")]
    pub seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    /// Abandon a run after this many rounds.
    #[arg(long, default_value = "10000")]
    pub max_rounds: u64,

    /// Append one JSON object per cell to this file.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

/// Execute `gossip sweep`.
pub fn run_sweep_cmd(args: &SweepArgs, output: OutputMode) -> Result<()> {
    if args.agents.is_empty() {
        bail!("at least one population size is required");
    }
    let strategies: Vec<Strategy> = if args.strategies.is_empty() {
        Strategy::ALL.to_vec()
    } else {
        args.strategies.clone()
    };

    let base = CampaignConfig {
        seed_start: args.seed_start,
        seeds: args.seeds,
        call_protocol: args.protocol,
        max_rounds: args.max_rounds,
        record_rounds: false,
        ..CampaignConfig::default()
    };
    let cells = run_sweep(&base, &args.agents, &strategies)?;

    if let Some(path) = &args.out {
        append_json_lines(path, &cells)?;
    }

    match output {
        OutputMode::Json => print_json(&cells)?,
        OutputMode::Text => {
            for cell in &cells {
                println!(
                    "cell strategy={} agents={} protocol={} mean={} std={} finished={}/{} failures={}",
                    cell.strategy,
                    cell.agent_count,
                    cell.call_protocol,
                    fmt_stat(cell.stats.mean),
                    fmt_stat(cell.stats.std_dev),
                    cell.stats.finished,
                    cell.stats.runs,
                    cell.failures
                );
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, "Strategy Sweep")?;
            pretty_kv(&mut w, "Protocol", args.protocol.to_string())?;
            pretty_kv(
                &mut w,
                "Seeds",
                format!("{} per cell starting at {}", args.seeds, args.seed_start),
            )?;
            println!();
            print_table(&cells, &args.agents, &strategies);
        }
    }

    if cells.iter().any(|cell| cell.failures > 0) {
        process::exit(1);
    }

    Ok(())
}

/// Mean time-steps per strategy (rows) and population size (columns).
fn print_table(cells: &[SweepCell], agents: &[usize], strategies: &[Strategy]) {
    let mut header = format!("{:<20}", "strategy");
    for n in agents {
        header.push_str(&format!("{:>12}", format!("N={n}")));
    }
    println!("{header}");
    println!("{:-<width$}", "", width = PRETTY_RULE_WIDTH.max(header.len()));

    for &strategy in strategies {
        let mut row = format!("{:<20}", strategy.name());
        for &n in agents {
            let cell = cells
                .iter()
                .find(|c| c.strategy == strategy && c.agent_count == n);
            row.push_str(&format!("{:>12}", cell.map_or_else(|| "-".to_string(), fmt_cell)));
        }
        println!("{row}");
    }
}

fn fmt_cell(cell: &SweepCell) -> String {
    let mean = fmt_stat(cell.stats.mean);
    if cell.stats.finished < cell.stats.runs {
        format!("{mean}*")
    } else {
        mean
    }
}
