//! Simulation lifecycle: configure, start, pause/resume, step, reset.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{Agent, AgentSnapshot};
use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::protocol::CallProtocol;
use crate::rng::DeterministicRng;
use crate::round::{CallState, Pairing, RoundEngine};
use crate::strategy::Strategy;

/// Lifecycle state of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Created,
    Configured,
    Running,
    Paused,
    Finished,
}

impl Lifecycle {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }

    /// `true` once `start()` has been called (and before a reset).
    #[must_use]
    pub const fn is_started(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Finished)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single `step()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Rounds completed so far.
    pub round_index: u64,
    /// Pairings committed by this step (empty when no round ran).
    pub pairings: Vec<Pairing>,
    /// Whether every agent now knows every secret.
    pub finished: bool,
    /// Whether a round actually executed.
    pub advanced: bool,
}

/// One gossip simulation run.
///
/// Owns its agents and random source exclusively. Independent instances share
/// nothing and may run on separate threads.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimulationConfig,
    lifecycle: Lifecycle,
    agents: Vec<Agent>,
    engine: RoundEngine,
    rng: DeterministicRng,
    round_index: u64,
}

impl Simulation {
    /// A simulation with no agents yet; call [`configure`](Self::configure).
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            config: SimulationConfig {
                seed,
                ..SimulationConfig::default()
            },
            lifecycle: Lifecycle::Created,
            agents: Vec::new(),
            engine: RoundEngine::new(0),
            rng: DeterministicRng::new(seed),
            round_index: 0,
        }
    }

    /// Build a configured simulation in one call.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `config` fails validation.
    pub fn initialize(config: SimulationConfig) -> Result<Self> {
        let mut sim = Self::new(config.seed);
        sim.configure(config.agent_count, config.strategy, config.call_protocol)?;
        Ok(sim)
    }

    /// (Re)create all agents with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TooFewAgents`] for fewer than two agents and
    /// [`SimError::InvalidTransition`] once the simulation has started.
    pub fn configure(
        &mut self,
        agent_count: usize,
        strategy: Strategy,
        call_protocol: CallProtocol,
    ) -> Result<()> {
        if self.lifecycle.is_started() {
            return Err(SimError::InvalidTransition {
                state: self.lifecycle.as_str(),
                action: "configure",
            });
        }

        let config = SimulationConfig {
            agent_count,
            strategy,
            call_protocol,
            seed: self.config.seed,
        };
        config.validate()?;

        self.config = config;
        self.rebuild();
        self.lifecycle = Lifecycle::Configured;
        debug!(
            agents = agent_count,
            strategy = %strategy,
            protocol = %call_protocol,
            "simulation configured"
        );
        Ok(())
    }

    /// Begin running. Only valid from `Configured`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidTransition`] from any other state.
    pub fn start(&mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Configured {
            return Err(SimError::InvalidTransition {
                state: self.lifecycle.as_str(),
                action: "start",
            });
        }
        self.lifecycle = Lifecycle::Running;
        debug!(
            agents = self.config.agent_count,
            strategy = %self.config.strategy,
            protocol = %self.config.call_protocol,
            seed = self.config.seed,
            "simulation started"
        );
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            self.lifecycle = Lifecycle::Paused;
            info!(round = self.round_index, "simulation paused");
        }
    }

    pub fn resume(&mut self) {
        if self.lifecycle == Lifecycle::Paused {
            self.lifecycle = Lifecycle::Running;
            info!(round = self.round_index, "simulation resumed");
        }
    }

    /// Run one round if the simulation is running.
    ///
    /// # Errors
    ///
    /// Propagates fatal invariant violations from the round engine.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.lifecycle != Lifecycle::Running {
            return Ok(StepOutcome {
                round_index: self.round_index,
                pairings: Vec::new(),
                finished: self.lifecycle == Lifecycle::Finished,
                advanced: false,
            });
        }

        let pairings = self
            .engine
            .execute(
                &mut self.agents,
                self.round_index,
                self.config.strategy,
                self.config.call_protocol,
                &mut self.rng,
            )?
            .to_vec();
        self.round_index += 1;

        let finished = self.agents.iter().all(Agent::is_complete);
        if finished {
            self.lifecycle = Lifecycle::Finished;
            debug!(
                rounds = self.round_index,
                "simulation finished after {} time-steps", self.round_index
            );
        }

        Ok(StepOutcome {
            round_index: self.round_index,
            pairings,
            finished,
            advanced: true,
        })
    }

    /// Fresh agents and counters with the current configuration.
    ///
    /// The random source rewinds to the configured seed, so a reset run
    /// replays the previous one exactly.
    pub fn reset(&mut self) {
        if self.lifecycle == Lifecycle::Created {
            return;
        }
        self.rebuild();
        self.lifecycle = Lifecycle::Configured;
        debug!("simulation reset");
    }

    /// Read-only projection of every agent.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.agents.iter().map(Agent::snapshot).collect()
    }

    #[must_use]
    pub fn round_index(&self) -> u64 {
        self.round_index
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lifecycle == Lifecycle::Finished
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Pairings committed by the most recent round.
    #[must_use]
    pub fn last_pairings(&self) -> &[Pairing] {
        self.engine.pairings_this_round()
    }

    /// Per-agent outcome of the most recent round.
    #[must_use]
    pub fn last_call_states(&self) -> &[CallState] {
        self.engine.call_states()
    }

    /// Total tokens held across the population.
    #[must_use]
    pub fn token_total(&self) -> usize {
        self.agents.iter().map(Agent::tokens).sum()
    }

    fn rebuild(&mut self) {
        let n = self.config.agent_count;
        self.agents = (0..n).map(|id| Agent::new(id, n)).collect();
        self.engine = RoundEngine::new(n);
        self.rng = DeterministicRng::new(self.config.seed);
        self.round_index = 0;
    }
}
