use std::collections::BTreeSet;

use crate::agent::{Agent, AgentId};
use crate::protocol::CallProtocol;
use crate::strategy::Strategy;

/// Legal peers for `caller` this round, in ascending id order.
///
/// Filters apply in a fixed order: the call protocol first, then the
/// strategy's own exclusions. An empty result means the caller sits the round
/// out; it is not an error.
#[must_use]
pub fn candidate_pool(
    caller: &Agent,
    agents: &[Agent],
    called_this_round: &BTreeSet<AgentId>,
    strategy: Strategy,
    protocol: CallProtocol,
) -> Vec<AgentId> {
    let traits = strategy.descriptor();
    let population = agents.len();

    agents
        .iter()
        .map(Agent::id)
        .filter(|&peer| peer != caller.id())
        .filter(|peer| !protocol.excludes_busy() || !called_this_round.contains(peer))
        .filter(|&peer| {
            !traits.excludes_believed_complete || caller.belief_about(peer) != population
        })
        .filter(|peer| !traits.excludes_permanent_peers || !caller.permanent_peers().contains(peer))
        // Owning a secret the caller already has is a cheap proxy for
        // "nothing new to learn from this peer".
        .filter(|&peer| !traits.excludes_known_owners || !caller.knows(peer))
        .collect()
}
