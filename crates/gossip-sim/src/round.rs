//! One synchronous round: candidate pools, selection, staged exchange, commit.
//!
//! Every exchange in a round reads the partner's `known` set as it was when
//! the round began. Received secrets land in the `incoming` staging area and
//! are folded in only after every caller has had its turn, so the outcome of a
//! round never depends on the order in which pairings formed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::agent::{Agent, AgentId, SecretId};
use crate::error::Result;
use crate::pool::candidate_pool;
use crate::protocol::CallProtocol;
use crate::rng::DeterministicRng;
use crate::strategy::{Strategy, StrategyDescriptor, select_peer};

/// Unordered pairing, stored as `(min, max)`.
pub type Pairing = (AgentId, AgentId);

/// What an agent ended up doing in the most recent round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// No call this round: skipped, forfeited, or the strategy declined.
    Idle,
    /// Part of a committed pairing.
    Paired,
    /// Had its turn but its candidate pool was empty.
    Exhausted,
}

/// Per-round pairing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundEngine {
    all_secrets: BTreeSet<SecretId>,
    called_this_round: BTreeSet<AgentId>,
    pairings_this_round: Vec<Pairing>,
    call_states: Vec<CallState>,
}

impl RoundEngine {
    #[must_use]
    pub fn new(population: usize) -> Self {
        Self {
            all_secrets: (0..population).collect(),
            called_this_round: BTreeSet::new(),
            pairings_this_round: Vec::new(),
            call_states: vec![CallState::Idle; population],
        }
    }

    #[must_use]
    pub fn all_secrets(&self) -> &BTreeSet<SecretId> {
        &self.all_secrets
    }

    #[must_use]
    pub fn called_this_round(&self) -> &BTreeSet<AgentId> {
        &self.called_this_round
    }

    /// Pairings committed in the most recent round, in commit order.
    #[must_use]
    pub fn pairings_this_round(&self) -> &[Pairing] {
        &self.pairings_this_round
    }

    #[must_use]
    pub fn call_states(&self) -> &[CallState] {
        &self.call_states
    }

    /// Run one full round over `agents` (indexed by id).
    ///
    /// # Errors
    ///
    /// Propagates [`crate::SimError::ProbeExhausted`] from peer selection.
    /// Every other anomaly (empty pool, idle strategy, busy peer) leaves the
    /// caller idle and is not reported.
    pub fn execute(
        &mut self,
        agents: &mut [Agent],
        round: u64,
        strategy: Strategy,
        protocol: CallProtocol,
        rng: &mut DeterministicRng,
    ) -> Result<&[Pairing]> {
        let population = agents.len();
        let traits = strategy.descriptor();

        let mut order: Vec<AgentId> = (0..population).collect();
        rng.shuffle(&mut order);

        self.called_this_round.clear();
        self.pairings_this_round.clear();
        self.call_states = vec![CallState::Idle; population];

        for caller in order {
            if self.called_this_round.contains(&caller) {
                continue;
            }
            if traits.is_token_gated() && !agents[caller].has_token() {
                trace!(caller, round, "no token, skipping");
                continue;
            }

            let mut pool = candidate_pool(
                &agents[caller],
                agents,
                &self.called_this_round,
                strategy,
                protocol,
            );
            if pool.is_empty() {
                self.call_states[caller] = CallState::Exhausted;
                continue;
            }

            rng.shuffle(&mut pool);
            let Some(peer) =
                select_peer(strategy, &agents[caller], &pool, round, population, rng)?
            else {
                continue;
            };

            if self.called_this_round.contains(&peer) {
                trace!(caller, peer, round, "peer already busy, call forfeited");
                continue;
            }

            self.commit(agents, caller, peer, &traits);
        }

        for agent in agents.iter_mut() {
            agent.merge_incoming();
        }

        debug!(
            round,
            pairings = self.pairings_this_round.len(),
            known = ?agents.iter().map(|a| a.known().len()).collect::<Vec<_>>(),
            "round complete"
        );

        Ok(&self.pairings_this_round)
    }

    fn commit(
        &mut self,
        agents: &mut [Agent],
        caller: AgentId,
        peer: AgentId,
        traits: &StrategyDescriptor,
    ) {
        let (a, b) = pair_mut(agents, caller, peer);

        // `known` is untouched until the end of the round, so both sides
        // stage the other's round-start knowledge.
        a.stage(b.known());
        b.stage(a.known());

        a.merge_belief(b.belief());
        b.merge_belief(a.belief());

        if traits.uses_token {
            a.transfer_token(b);
        }
        if traits.uses_spider_token {
            b.transfer_token(a);
        }

        a.record_pairing(peer);
        b.record_pairing(caller);

        if traits.assigns_targets {
            assign_divide_targets(a, b, &self.all_secrets);
        }

        self.called_this_round.insert(caller);
        self.called_this_round.insert(peer);
        self.call_states[caller] = CallState::Paired;
        self.call_states[peer] = CallState::Paired;
        self.pairings_this_round
            .push((caller.min(peer), caller.max(peer)));
    }
}

/// Split the secrets neither side knows yet between the two partners.
///
/// The caller takes the lower half (by id), the peer the rest. Each side
/// stores its share keyed by the other, meaning "collect these, then call
/// back". Secrets either side already knows are never assigned.
fn assign_divide_targets(a: &mut Agent, b: &mut Agent, all_secrets: &BTreeSet<SecretId>) {
    let missing: Vec<SecretId> = all_secrets
        .iter()
        .copied()
        .filter(|&secret| !a.knows(secret) && !b.knows(secret))
        .collect();
    let (first, second) = missing.split_at(missing.len() / 2);

    let (a_id, b_id) = (a.id(), b.id());
    a.assign_targets(b_id, first.iter().copied().collect());
    b.assign_targets(a_id, second.iter().copied().collect());
}

fn pair_mut(agents: &mut [Agent], a: AgentId, b: AgentId) -> (&mut Agent, &mut Agent) {
    debug_assert_ne!(a, b, "an agent cannot pair with itself");
    if a < b {
        let (lo, hi) = agents.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = agents.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::mathematical_start;

    fn population(n: usize) -> Vec<Agent> {
        (0..n).map(|id| Agent::new(id, n)).collect()
    }

    fn run_round(
        agents: &mut [Agent],
        round: u64,
        strategy: Strategy,
        protocol: CallProtocol,
        seed: u64,
    ) -> Vec<Pairing> {
        let mut engine = RoundEngine::new(agents.len());
        let mut rng = DeterministicRng::new(seed);
        engine
            .execute(agents, round, strategy, protocol, &mut rng)
            .expect("round should not fail")
            .to_vec()
    }

    #[test]
    fn each_agent_pairs_at_most_once_per_round() {
        for seed in 0..20 {
            let mut agents = population(9);
            let pairings = run_round(
                &mut agents,
                0,
                Strategy::Random,
                CallProtocol::NotStandard,
                seed,
            );
            let mut seen = BTreeSet::new();
            for (a, b) in pairings {
                assert!(a < b);
                assert!(seen.insert(a), "agent {a} paired twice (seed {seed})");
                assert!(seen.insert(b), "agent {b} paired twice (seed {seed})");
            }
        }
    }

    #[test]
    fn exchange_uses_round_start_knowledge() {
        let mut agents = population(8);
        let before: Vec<BTreeSet<SecretId>> = agents.iter().map(|a| a.known().clone()).collect();
        let pairings = run_round(&mut agents, 0, Strategy::Random, CallProtocol::Standard, 4);
        assert!(!pairings.is_empty());

        let mut paired = BTreeSet::new();
        for &(a, b) in &pairings {
            let expected: BTreeSet<_> = before[a].union(&before[b]).copied().collect();
            assert_eq!(agents[a].known(), &expected);
            assert_eq!(agents[b].known(), &expected);
            paired.insert(a);
            paired.insert(b);
        }
        for agent in &agents {
            if !paired.contains(&agent.id()) {
                assert_eq!(agent.known(), &before[agent.id()]);
            }
        }
    }

    #[test]
    fn standard_protocol_with_even_population_pairs_everyone_in_random() {
        // Under Standard admission the pool only shrinks by paired agents, so
        // every caller finds a partner while one is left.
        let mut agents = population(6);
        let pairings = run_round(&mut agents, 0, Strategy::Random, CallProtocol::Standard, 12);
        assert_eq!(pairings.len(), 3);
    }

    #[test]
    fn beliefs_gossip_during_commit() {
        let mut agents = population(2);
        run_round(&mut agents, 0, Strategy::Random, CallProtocol::Standard, 1);
        // Both merged each other's round-start self-estimate (1), then
        // refreshed their own to 2.
        assert_eq!(agents[0].belief(), &[2, 1]);
        assert_eq!(agents[1].belief(), &[1, 2]);
    }

    #[test]
    fn token_moves_from_caller_to_peer() {
        let mut agents = population(2);
        let mut engine = RoundEngine::new(2);
        let mut rng = DeterministicRng::new(3);
        engine
            .execute(
                &mut agents,
                0,
                Strategy::Token,
                CallProtocol::Standard,
                &mut rng,
            )
            .expect("round");
        let tokens: Vec<usize> = agents.iter().map(Agent::tokens).collect();
        assert_eq!(tokens.iter().sum::<usize>(), 2);
        assert!(tokens.contains(&0) && tokens.contains(&2));
    }

    #[test]
    fn tokenless_agents_cannot_initiate() {
        let mut agents = population(3);
        let (a, b) = pair_mut(&mut agents, 0, 1);
        a.transfer_token(b);
        // Only agent 2 (one token) and agent 1 (two tokens) may call.
        let mut engine = RoundEngine::new(3);
        let mut rng = DeterministicRng::new(9);
        engine
            .execute(
                &mut agents,
                0,
                Strategy::Spider,
                CallProtocol::Standard,
                &mut rng,
            )
            .expect("round");
        assert_eq!(agents.iter().map(Agent::tokens).sum::<usize>(), 3);
        assert_eq!(engine.pairings_this_round().len(), 1);
    }

    #[test]
    fn exhausted_agents_are_marked() {
        let mut agents = population(2);
        let mut engine = RoundEngine::new(2);
        let mut rng = DeterministicRng::new(0);
        // Round 0 pairs them; afterwards Call-Me-Once leaves nobody to call.
        engine
            .execute(
                &mut agents,
                0,
                Strategy::CallMeOnce,
                CallProtocol::Standard,
                &mut rng,
            )
            .expect("round 0");
        engine
            .execute(
                &mut agents,
                1,
                Strategy::CallMeOnce,
                CallProtocol::Standard,
                &mut rng,
            )
            .expect("round 1");
        assert!(engine.pairings_this_round().is_empty());
        assert_eq!(
            engine.call_states(),
            &[CallState::Exhausted, CallState::Exhausted]
        );
    }

    #[test]
    fn divide_assigns_disjoint_halves_of_missing_secrets() {
        let mut agents = population(6);
        let all: BTreeSet<SecretId> = (0..6).collect();
        let (a, b) = pair_mut(&mut agents, 1, 4);
        assign_divide_targets(a, b, &all);

        let for_peer = agents[1].pending_targets().get(&4).cloned().unwrap_or_default();
        let for_caller = agents[4].pending_targets().get(&1).cloned().unwrap_or_default();
        assert_eq!(for_peer, BTreeSet::from([0, 2]));
        assert_eq!(for_caller, BTreeSet::from([3, 5]));
    }

    #[test]
    fn busy_target_forfeits_without_reselecting() {
        // Mathematical round 0 on four agents: 0 and 2 both start at 1,
        // 1 starts at 3, and 3 starts on itself and moves on to 0.
        for (id, target) in [(0, 1), (1, 3), (2, 1)] {
            assert_eq!(mathematical_start(id, 0, 4), target);
        }
        assert_eq!(mathematical_start(3, 0, 4), 3);

        let mut single_pairing_rounds = 0;
        for seed in 0..32 {
            let mut agents = population(4);
            let mut engine = RoundEngine::new(4);
            let mut rng = DeterministicRng::new(seed);
            let pairings = engine
                .execute(
                    &mut agents,
                    0,
                    Strategy::Mathematical,
                    CallProtocol::NotStandard,
                    &mut rng,
                )
                .expect("round")
                .to_vec();

            for pairing in &pairings {
                assert!(
                    [(0, 1), (1, 3), (1, 2), (0, 3)].contains(pairing),
                    "{pairing:?} is not a first-choice call (seed {seed})"
                );
            }

            let idle: Vec<AgentId> = (0..4)
                .filter(|&id| engine.call_states()[id] == CallState::Idle)
                .collect();
            assert_eq!(idle.len(), 4 - 2 * pairings.len(), "seed {seed}");
            for &id in &idle {
                assert!(!pairings.iter().any(|&(a, b)| a == id || b == id));
                assert_eq!(agents[id].known().len(), 1, "idle agent {id} learned something");
            }

            if pairings.len() == 1 {
                // Both leftover agents were free, so a second pick would
                // have paired them. They stayed idle instead.
                assert_eq!(idle.len(), 2);
                single_pairing_rounds += 1;
            }
        }
        assert!(
            single_pairing_rounds > 0,
            "no seed put a busy peer first in line"
        );
    }

    #[test]
    fn standard_protocol_never_offers_a_busy_peer() {
        for seed in 0..32 {
            let mut agents = population(4);
            let pairings = run_round(
                &mut agents,
                0,
                Strategy::Mathematical,
                CallProtocol::Standard,
                seed,
            );
            assert_eq!(pairings.len(), 2, "seed {seed}");
        }
    }

    #[test]
    fn same_seed_same_round() {
        let mut left = population(10);
        let mut right = population(10);
        let a = run_round(&mut left, 0, Strategy::Random, CallProtocol::NotStandard, 77);
        let b = run_round(&mut right, 0, Strategy::Random, CallProtocol::NotStandard, 77);
        assert_eq!(a, b);
        assert_eq!(left, right);
    }
}
