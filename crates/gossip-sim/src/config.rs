use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignConfig;
use crate::error::SimError;
use crate::protocol::CallProtocol;
use crate::strategy::Strategy;

/// Smallest population for which gossip is meaningful.
pub const MIN_AGENTS: usize = 2;

/// Settings for a single simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of agents (and secrets).
    pub agent_count: usize,
    /// Peer-selection policy.
    pub strategy: Strategy,
    /// Call-admission rule.
    pub call_protocol: CallProtocol,
    /// Seed for both the initiation-order and candidate-pool shuffles.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            agent_count: 10,
            strategy: Strategy::Random,
            call_protocol: CallProtocol::Standard,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Validate configuration before building agents.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TooFewAgents`] when `agent_count < 2`.
    pub fn validate(&self) -> std::result::Result<(), SimError> {
        if self.agent_count < MIN_AGENTS {
            return Err(SimError::TooFewAgents {
                requested: self.agent_count,
            });
        }
        Ok(())
    }
}

/// Parse a campaign configuration from TOML text. Missing keys take defaults.
///
/// # Errors
///
/// Returns [`SimError::UnknownStrategy`] or [`SimError::UnknownCallProtocol`]
/// for names that do not parse, and [`SimError::Config`] for anything else
/// that is malformed.
pub fn parse_campaign_config(content: &str) -> std::result::Result<CampaignConfig, SimError> {
    let table: toml::Table = content
        .parse()
        .map_err(|err: toml::de::Error| SimError::Config(err.to_string()))?;

    // Names are checked first so a typo reports its own error code.
    if let Some(name) = table.get("strategy").and_then(toml::Value::as_str) {
        name.parse::<Strategy>()?;
    }
    if let Some(name) = table.get("call_protocol").and_then(toml::Value::as_str) {
        name.parse::<CallProtocol>()?;
    }

    toml::Value::Table(table)
        .try_into()
        .map_err(|err: toml::de::Error| SimError::Config(err.to_string()))
}

/// Read a campaign configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_campaign_config(path: &Path) -> Result<CampaignConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_campaign_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
