//! `gossip replay`: run a single seed and show its full trace.

use std::process;

use anyhow::Result;
use clap::Args;
use gossip_sim::{CallProtocol, Pairing, Strategy, replay_seed};
use serde::Serialize;
use tracing::info;

use super::SimParams;
use crate::output::{OutputMode, pretty_kv, pretty_section, print_json};

/// Arguments for `gossip replay`.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub params: SimParams,

    /// Seed to replay. A random seed is picked (and reported) when omitted.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Include every round's pairings in the output.
    #[arg(long)]
    pub rounds: bool,
}

#[derive(Debug, Serialize)]
struct AgentOutput {
    id: usize,
    known_count: usize,
    tokens: usize,
}

#[derive(Debug, Serialize)]
struct RoundOutput {
    round: u64,
    pairings: Vec<Pairing>,
}

/// JSON output for `gossip replay`.
#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    agents: usize,
    strategy: Strategy,
    call_protocol: CallProtocol,
    timesteps_taken: u64,
    finished: bool,
    oracle_passed: bool,
    violations: Vec<String>,
    trace_fingerprint: u64,
    states: Vec<AgentOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rounds: Option<Vec<RoundOutput>>,
}

/// Execute `gossip replay`.
pub fn run_replay(args: &ReplayArgs, output: OutputMode) -> Result<()> {
    let mut config = args.params.campaign_config()?;
    config.seeds = 1;
    if args.rounds {
        config.record_rounds = true;
    }
    let seed = args.seed.unwrap_or_else(|| {
        let seed = rand::random::<u64>();
        info!(seed, "no seed given, picked one at random");
        seed
    });

    let run = replay_seed(seed, &config)?;

    let out = ReplayOutput {
        seed,
        agents: config.agent_count,
        strategy: config.strategy,
        call_protocol: config.call_protocol,
        timesteps_taken: run.record.timesteps_taken,
        finished: run.record.finished,
        oracle_passed: run.oracle.passed,
        violations: run.oracle.violations.iter().map(ToString::to_string).collect(),
        trace_fingerprint: run.trace.fingerprint(),
        states: run
            .trace
            .final_states
            .iter()
            .map(|state| AgentOutput {
                id: state.id,
                known_count: state.known_count,
                tokens: state.tokens,
            })
            .collect(),
        rounds: args.rounds.then(|| {
            run.trace
                .rounds
                .iter()
                .map(|record| RoundOutput {
                    round: record.round,
                    pairings: record.pairings.clone(),
                })
                .collect()
        }),
    };

    match output {
        OutputMode::Json => print_json(&out)?,
        OutputMode::Text => {
            println!(
                "replay seed={} agents={} strategy={} protocol={}",
                out.seed, out.agents, out.strategy, out.call_protocol
            );
            println!(
                "result finished={} timesteps={} oracle_passed={} trace_fingerprint={:016x}",
                out.finished, out.timesteps_taken, out.oracle_passed, out.trace_fingerprint
            );
            for violation in &out.violations {
                println!("violation={violation}");
            }
            for round in out.rounds.iter().flatten() {
                println!("round index={} pairings={}", round.round, fmt_pairings(&round.pairings));
            }
            for state in &out.states {
                println!(
                    "agent id={} known={} tokens={}",
                    state.id, state.known_count, state.tokens
                );
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(&mut w, "Agents", out.agents.to_string())?;
            pretty_kv(&mut w, "Strategy", out.strategy.to_string())?;
            pretty_kv(&mut w, "Protocol", out.call_protocol.to_string())?;
            pretty_kv(
                &mut w,
                "Time-steps",
                if out.finished {
                    out.timesteps_taken.to_string()
                } else {
                    format!("{} (round limit, not finished)", out.timesteps_taken)
                },
            )?;
            pretty_kv(
                &mut w,
                "Fingerprint",
                format!("{:016x}", out.trace_fingerprint),
            )?;
            pretty_kv(&mut w, "Oracle", out.oracle_passed.to_string())?;

            if !out.oracle_passed {
                println!();
                pretty_section(&mut w, "Invariant Violations")?;
                for violation in &out.violations {
                    println!("- {violation}");
                }
            }

            if let Some(rounds) = &out.rounds {
                println!();
                pretty_section(&mut w, "Rounds")?;
                for round in rounds {
                    println!("round {:<6} {}", round.round, fmt_pairings(&round.pairings));
                }
            }

            println!();
            pretty_section(&mut w, "Agent States")?;
            for state in &out.states {
                println!(
                    "agent {:<6} known={:<6} tokens={}",
                    state.id, state.known_count, state.tokens
                );
            }
        }
    }

    if !run.oracle.passed {
        process::exit(1);
    }

    Ok(())
}

fn fmt_pairings(pairings: &[Pairing]) -> String {
    if pairings.is_empty() {
        return "-".to_string();
    }
    pairings
        .iter()
        .map(|(a, b)| format!("{a}-{b}"))
        .collect::<Vec<_>>()
        .join(",")
}
