pub mod replay;
pub mod run;
pub mod strategies;
pub mod sweep;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use gossip_sim::{CallProtocol, CampaignConfig, Strategy, load_campaign_config};

/// Simulation parameters shared by `run` and `replay`.
///
/// Values come from `--config` (or built-in defaults), then any flag given
/// on the command line overrides the file.
#[derive(Args, Debug, Default)]
pub struct SimParams {
    /// TOML campaign file supplying defaults for the flags below.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of agents (and secrets).
    #[arg(short = 'n', long)]
    pub agents: Option<usize>,

    /// Peer-selection strategy, e.g. `Random`, `Call-Me-Once`, `Divide`.
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Call protocol: `Standard` or `Not-Standard`.
    #[arg(short, long)]
    pub protocol: Option<CallProtocol>,

    /// Abandon a run after this many rounds.
    #[arg(long)]
    pub max_rounds: Option<u64>,
}

impl SimParams {
    /// Layer the command-line flags over the config file.
    pub fn campaign_config(&self) -> Result<CampaignConfig> {
        let mut config = match &self.config {
            Some(path) => load_campaign_config(path)?,
            None => CampaignConfig::default(),
        };
        if let Some(agents) = self.agents {
            config.agent_count = agents;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(protocol) = self.protocol {
            config.call_protocol = protocol;
        }
        if let Some(max_rounds) = self.max_rounds {
            config.max_rounds = max_rounds;
        }
        config.validate()?;
        Ok(config)
    }
}
