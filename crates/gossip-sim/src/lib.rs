//! gossip-sim library.
//!
//! Simulates the gossip problem: `N` agents each start with one secret and
//! exchange everything they know in pairwise calls, one synchronous round at
//! a time, until every agent knows every secret.
//!
//! # Conventions
//!
//! - **Errors**: Domain operations return [`SimError`]; batch and file entry
//!   points use `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//! - **Determinism**: All randomness flows from a seeded [`DeterministicRng`].

pub mod agent;
pub mod campaign;
pub mod config;
pub mod controller;
pub mod error;
pub mod oracle;
pub mod pool;
pub mod protocol;
pub mod rng;
pub mod round;
pub mod strategy;

pub use agent::{Agent, AgentId, AgentSnapshot, SecretId};
pub use campaign::{
    CampaignConfig, CampaignReport, DetailedTrace, RoundRecord, RunRecord, RunTrace, SeedFailure,
    SweepCell, TimestepStats, replay_seed, run_campaign, run_sweep,
};
pub use config::{MIN_AGENTS, SimulationConfig, load_campaign_config, parse_campaign_config};
pub use controller::{Lifecycle, Simulation, StepOutcome};
pub use error::{ErrorCode, SimError};
pub use oracle::{GossipOracle, InvariantViolation, OracleResult};
pub use protocol::CallProtocol;
pub use rng::DeterministicRng;
pub use round::{CallState, Pairing, RoundEngine};
pub use strategy::{SelectionRule, Strategy, StrategyDescriptor};
