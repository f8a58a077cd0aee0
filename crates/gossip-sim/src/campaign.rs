//! Batch runner for gossip experiments.
//!
//! Executes one configuration across a range of seeds, records how many
//! time-steps each run took, summarizes them (mean and sample standard
//! deviation) and checks every run against [`GossipOracle`].

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::AgentSnapshot;
use crate::config::{MIN_AGENTS, SimulationConfig};
use crate::controller::Simulation;
use crate::oracle::{GossipOracle, OracleResult};
use crate::protocol::CallProtocol;
use crate::round::Pairing;
use crate::strategy::Strategy;

/// Campaign-level configuration: which settings to run and for how many seeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// First seed to execute.
    pub seed_start: u64,
    /// Number of consecutive seeds (one run each).
    pub seeds: u64,
    /// Number of agents per run.
    pub agent_count: usize,
    pub strategy: Strategy,
    pub call_protocol: CallProtocol,
    /// Rounds after which an unfinished run is abandoned.
    pub max_rounds: u64,
    /// Keep per-round snapshots so every round can be checked by the oracle.
    pub record_rounds: bool,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_start: 0,
            seeds: 100,
            agent_count: 10,
            strategy: Strategy::Random,
            call_protocol: CallProtocol::Standard,
            max_rounds: 10_000,
            record_rounds: true,
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub fn seed_range(&self) -> Range<u64> {
        self.seed_start..self.seed_start.saturating_add(self.seeds)
    }

    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            agent_count: self.agent_count,
            strategy: self.strategy,
            call_protocol: self.call_protocol,
            seed,
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seeds == 0 {
            bail!("seeds must be > 0");
        }
        if self.agent_count < MIN_AGENTS {
            bail!("agent_count must be >= {MIN_AGENTS}");
        }
        if self.max_rounds == 0 {
            bail!("max_rounds must be > 0");
        }
        Ok(())
    }
}

/// One finished (or abandoned) run, shaped for tabular storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub num_simulations: u64,
    pub num_agents: usize,
    pub strategy: Strategy,
    pub call_protocol: CallProtocol,
    pub timesteps_taken: u64,
    /// `false` when the run hit `max_rounds` first.
    pub finished: bool,
    pub seed: u64,
}

/// Pairings and post-round state of one executed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Zero-based round index.
    pub round: u64,
    pub pairings: Vec<Pairing>,
    pub states: Vec<AgentSnapshot>,
}

/// Everything observed during one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTrace {
    pub population: usize,
    pub strategy: Strategy,
    pub initial: Vec<AgentSnapshot>,
    /// Empty unless per-round recording was enabled.
    pub rounds: Vec<RoundRecord>,
    pub final_states: Vec<AgentSnapshot>,
    pub finished: bool,
}

impl RunTrace {
    /// Stable fingerprint of the pairing sequence, for comparing replays.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for record in &self.rounds {
            for &(a, b) in &record.pairings {
                for value in [record.round, a as u64, b as u64] {
                    hash ^= value;
                    hash = hash.wrapping_mul(0x0100_0000_01b3);
                }
            }
        }
        hash
    }
}

/// Summary of time-steps over the finished runs of a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestepStats {
    pub runs: usize,
    pub finished: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; `None` with fewer than two finished runs.
    pub std_dev: Option<f64>,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl TimestepStats {
    #[must_use]
    pub fn from_records(records: &[RunRecord]) -> Self {
        let steps: Vec<u64> = records
            .iter()
            .filter(|record| record.finished)
            .map(|record| record.timesteps_taken)
            .collect();

        let count = steps.len();
        let mean = (count > 0).then(|| steps.iter().map(|&s| s as f64).sum::<f64>() / count as f64);
        let std_dev = mean.filter(|_| count > 1).map(|mean| {
            let var = steps
                .iter()
                .map(|&s| {
                    let d = s as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / (count - 1) as f64;
            var.sqrt()
        });

        Self {
            runs: records.len(),
            finished: count,
            mean,
            std_dev,
            min: steps.iter().min().copied(),
            max: steps.iter().max().copied(),
        }
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub records: Vec<RunRecord>,
    pub stats: TimestepStats,
    /// First seed that violated an invariant (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
}

impl CampaignReport {
    /// True if every seed passed the oracle.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Detailed result of replaying a single seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub record: RunRecord,
    pub trace: RunTrace,
    pub oracle: OracleResult,
}

/// One cell of a strategy x population sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepCell {
    pub agent_count: usize,
    pub strategy: Strategy,
    pub call_protocol: CallProtocol,
    pub stats: TimestepStats,
    pub failures: usize,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a run hits a fatal
/// invariant violation inside the engine.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut records = Vec::new();
    let mut failures = Vec::new();
    let mut first_failure: Option<u64> = None;

    for seed in config.seed_range() {
        let run = replay_seed(seed, config)?;
        if !run.oracle.passed {
            first_failure.get_or_insert(seed);
            failures.push(SeedFailure {
                seed,
                violations: run.oracle.violations.iter().map(ToString::to_string).collect(),
            });
        }
        records.push(run.record);
    }

    let stats = TimestepStats::from_records(&records);
    info!(
        agents = config.agent_count,
        strategy = %config.strategy,
        protocol = %config.call_protocol,
        runs = stats.runs,
        finished = stats.finished,
        mean = ?stats.mean,
        std_dev = ?stats.std_dev,
        "campaign complete"
    );

    Ok(CampaignReport {
        records,
        stats,
        first_failure,
        failures,
    })
}

/// Run one seed to completion (or `max_rounds`) and check it.
///
/// # Errors
///
/// Returns an error when the config is invalid or the engine reports a fatal
/// invariant violation.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;

    let mut sim = Simulation::initialize(config.sim_config_for_seed(seed))?;
    let initial = sim.snapshot();
    let mut rounds = Vec::new();

    sim.start()?;
    while !sim.is_finished() && sim.round_index() < config.max_rounds {
        let outcome = sim.step()?;
        if config.record_rounds {
            rounds.push(RoundRecord {
                round: outcome.round_index.saturating_sub(1),
                pairings: outcome.pairings,
                states: sim.snapshot(),
            });
        }
    }

    let finished = sim.is_finished();
    if finished {
        debug!(seed, rounds = sim.round_index(), "run finished");
    } else {
        warn!(
            seed,
            max_rounds = config.max_rounds,
            strategy = %config.strategy,
            "run did not finish within the round limit"
        );
    }

    let record = RunRecord {
        num_simulations: config.seeds,
        num_agents: config.agent_count,
        strategy: config.strategy,
        call_protocol: config.call_protocol,
        timesteps_taken: sim.round_index(),
        finished,
        seed,
    };
    let trace = RunTrace {
        population: config.agent_count,
        strategy: config.strategy,
        initial,
        rounds,
        final_states: sim.snapshot(),
        finished,
    };
    let oracle = GossipOracle::check_all(&trace);

    Ok(DetailedTrace {
        record,
        trace,
        oracle,
    })
}

/// Run `base` for every combination of population size and strategy.
///
/// # Errors
///
/// Returns the first campaign error encountered.
pub fn run_sweep(
    base: &CampaignConfig,
    agent_counts: &[usize],
    strategies: &[Strategy],
) -> Result<Vec<SweepCell>> {
    let mut cells = Vec::with_capacity(agent_counts.len() * strategies.len());
    for &strategy in strategies {
        for &agent_count in agent_counts {
            let config = CampaignConfig {
                agent_count,
                strategy,
                ..base.clone()
            };
            let report = run_campaign(&config)?;
            cells.push(SweepCell {
                agent_count,
                strategy,
                call_protocol: config.call_protocol,
                stats: report.stats,
                failures: report.failures.len(),
            });
        }
    }
    Ok(cells)
}
