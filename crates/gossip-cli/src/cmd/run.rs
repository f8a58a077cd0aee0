//! `gossip run`: execute one configuration across a range of seeds.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Args;
use gossip_sim::{CallProtocol, SeedFailure, Strategy, run_campaign};
use serde::Serialize;

use super::SimParams;
use crate::output::{
    OutputMode, append_json_lines, fmt_stat, pretty_kv, pretty_section, print_json,
};

/// Arguments for `gossip run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub params: SimParams,

    /// Number of seeds to run, one simulation each.
    #[arg(long)]
    pub seeds: Option<u64>,

    /// Starting seed value.
    #[arg(long)]
    pub seed_start: Option<u64>,

    /// Append one JSON record per run to this file.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Skip per-round snapshots; the oracle then only checks final states.
    #[arg(long)]
    pub no_trace: bool,
}

/// JSON output for `gossip run`.
#[derive(Debug, Serialize)]
struct RunOutput {
    agents: usize,
    strategy: Strategy,
    call_protocol: CallProtocol,
    seeds_run: usize,
    finished: usize,
    unfinished: usize,
    mean_timesteps: Option<f64>,
    std_timesteps: Option<f64>,
    min_timesteps: Option<u64>,
    max_timesteps: Option<u64>,
    first_failure: Option<u64>,
    all_passed: bool,
    failures: Vec<SeedFailure>,
}

/// Execute `gossip run`.
pub fn run_run(args: &RunArgs, output: OutputMode) -> Result<()> {
    let mut config = args.params.campaign_config()?;
    if let Some(seeds) = args.seeds {
        config.seeds = seeds;
    }
    if let Some(seed_start) = args.seed_start {
        config.seed_start = seed_start;
    }
    if args.no_trace {
        config.record_rounds = false;
    }

    let report = run_campaign(&config)?;

    if let Some(path) = &args.out {
        append_json_lines(path, &report.records)?;
    }

    let stats = &report.stats;
    let out = RunOutput {
        agents: config.agent_count,
        strategy: config.strategy,
        call_protocol: config.call_protocol,
        seeds_run: stats.runs,
        finished: stats.finished,
        unfinished: stats.runs - stats.finished,
        mean_timesteps: stats.mean,
        std_timesteps: stats.std_dev,
        min_timesteps: stats.min,
        max_timesteps: stats.max,
        first_failure: report.first_failure,
        all_passed: report.all_passed(),
        failures: report.failures.clone(),
    };

    match output {
        OutputMode::Json => print_json(&out)?,
        OutputMode::Text => {
            println!(
                "campaign agents={} strategy={} protocol={} seeds_run={} seed_start={}",
                out.agents, out.strategy, out.call_protocol, out.seeds_run, config.seed_start
            );
            println!(
                "timesteps mean={} std={} min={} max={} finished={} unfinished={}",
                fmt_stat(out.mean_timesteps),
                fmt_stat(out.std_timesteps),
                out.min_timesteps.map_or_else(|| "-".to_string(), |v| v.to_string()),
                out.max_timesteps.map_or_else(|| "-".to_string(), |v| v.to_string()),
                out.finished,
                out.unfinished
            );
            println!(
                "oracle all_passed={} failed={}",
                out.all_passed,
                out.failures.len()
            );
            for failure in out.failures.iter().take(5) {
                println!(
                    "failure seed={} violations={}",
                    failure.seed,
                    failure.violations.len()
                );
            }
            if out.failures.len() > 5 {
                println!("failures_truncated count={}", out.failures.len() - 5);
            }
            if let Some(seed) = out.first_failure {
                println!(
                    "hint replay_seed={seed} agents={} strategy={}",
                    out.agents, out.strategy
                );
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, "Gossip Campaign")?;
            pretty_kv(&mut w, "Agents", out.agents.to_string())?;
            pretty_kv(&mut w, "Strategy", out.strategy.to_string())?;
            pretty_kv(&mut w, "Protocol", out.call_protocol.to_string())?;
            pretty_kv(
                &mut w,
                "Seeds",
                format!("{} starting at {}", out.seeds_run, config.seed_start),
            )?;
            pretty_kv(
                &mut w,
                "Time-steps",
                format!(
                    "mean {} / std {}",
                    fmt_stat(out.mean_timesteps),
                    fmt_stat(out.std_timesteps)
                ),
            )?;
            if let (Some(min), Some(max)) = (out.min_timesteps, out.max_timesteps) {
                pretty_kv(&mut w, "Range", format!("{min}..={max}"))?;
            }
            pretty_kv(
                &mut w,
                "Finished",
                format!("{} of {} runs", out.finished, out.seeds_run),
            )?;

            if out.all_passed {
                pretty_kv(&mut w, "Oracle", "all seeds passed")?;
            } else {
                pretty_kv(
                    &mut w,
                    "Oracle",
                    format!(
                        "{} failures (first at seed {})",
                        out.failures.len(),
                        out.first_failure.unwrap_or(0)
                    ),
                )?;
                println!();
                pretty_section(&mut w, "Failure Samples")?;
                for failure in out.failures.iter().take(5) {
                    println!(
                        "seed {:<8} violations={}",
                        failure.seed,
                        failure.violations.len()
                    );
                    for violation in &failure.violations {
                        println!("  - {violation}");
                    }
                }
                if out.failures.len() > 5 {
                    println!("... and {} more failures", out.failures.len() - 5);
                }
                println!();
                pretty_kv(
                    &mut w,
                    "Replay",
                    format!(
                        "gossip replay --seed {} --agents {} --strategy {}",
                        out.first_failure.unwrap_or(0),
                        out.agents,
                        out.strategy
                    ),
                )?;
            }
            if let Some(path) = &args.out {
                pretty_kv(&mut w, "Saved", path.display().to_string())?;
            }
        }
    }

    // Exit code 1 on any invariant violation for CI integration
    if !report.all_passed() {
        process::exit(1);
    }

    Ok(())
}
