//! Peer-selection strategies.
//!
//! A [`Strategy`] is a closed set of policies. Each variant maps to a static
//! [`StrategyDescriptor`] carrying its capability flags (token passing, pool
//! exclusions) and the [`SelectionRule`] used to pick a peer from a shuffled
//! candidate pool. Selection functions are pure over the caller's state, the
//! pool and the round index; only the uniform fallback draws from the RNG.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::agent::{Agent, AgentId};
use crate::error::{Result, SimError};
use crate::rng::DeterministicRng;

/// Peer-selection policy.
///
/// Deserializes through [`FromStr`], so config files accept the same spellings
/// as the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Strategy {
    #[default]
    Random,
    #[serde(rename = "Call-Me-Once")]
    CallMeOnce,
    #[serde(rename = "Learn-New-Secrets")]
    LearnNewSecrets,
    Bubble,
    Mathematical,
    Token,
    Spider,
    #[serde(rename = "Token-improved")]
    TokenImproved,
    #[serde(rename = "Spider-improved")]
    SpiderImproved,
    #[serde(rename = "Call-Min-Secrets")]
    CallMinSecrets,
    #[serde(rename = "Call-Max-Secrets")]
    CallMaxSecrets,
    #[serde(rename = "Call-Best-Secrets")]
    CallBestSecrets,
    Divide,
}

/// How a strategy picks one peer out of a non-empty shuffled pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    /// Uniform random choice.
    Uniform,
    /// Deterministic hypercube partner; idle when the partner is unavailable.
    Bubble,
    /// Arithmetic start index followed by a bounded linear probe.
    Mathematical,
    /// Lowest believed secret count.
    MinBelief,
    /// Highest believed secret count.
    MaxBelief,
    /// Min when complete, otherwise max outside the recent-peer window.
    BestBelief,
    /// Prefer peers with satisfied, then pending, target assignments.
    Divide,
}

/// Static description of a strategy's capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyDescriptor {
    pub name: &'static str,
    pub rule: SelectionRule,
    /// Caller hands its token to the peer after a committed call.
    pub uses_token: bool,
    /// Peer hands its token to the caller after a committed call.
    pub uses_spider_token: bool,
    /// Drop peers the caller believes already know every secret.
    pub excludes_believed_complete: bool,
    /// Drop every peer the caller has ever been paired with.
    pub excludes_permanent_peers: bool,
    /// Drop peers whose own secret the caller already knows.
    pub excludes_known_owners: bool,
    /// Recompute Divide target assignments on every committed call.
    pub assigns_targets: bool,
}

impl StrategyDescriptor {
    const fn new(name: &'static str, rule: SelectionRule) -> Self {
        Self {
            name,
            rule,
            uses_token: false,
            uses_spider_token: false,
            excludes_believed_complete: false,
            excludes_permanent_peers: false,
            excludes_known_owners: false,
            assigns_targets: false,
        }
    }

    /// Callers without a token sit the round out.
    #[must_use]
    pub const fn is_token_gated(&self) -> bool {
        self.uses_token || self.uses_spider_token
    }
}

impl Strategy {
    pub const ALL: [Self; 13] = [
        Self::Random,
        Self::CallMeOnce,
        Self::LearnNewSecrets,
        Self::Bubble,
        Self::Mathematical,
        Self::Token,
        Self::Spider,
        Self::TokenImproved,
        Self::SpiderImproved,
        Self::CallMinSecrets,
        Self::CallMaxSecrets,
        Self::CallBestSecrets,
        Self::Divide,
    ];

    #[must_use]
    pub const fn descriptor(self) -> StrategyDescriptor {
        use SelectionRule as R;
        match self {
            Self::Random => StrategyDescriptor::new("Random", R::Uniform),
            Self::CallMeOnce => StrategyDescriptor {
                excludes_permanent_peers: true,
                ..StrategyDescriptor::new("Call-Me-Once", R::Uniform)
            },
            Self::LearnNewSecrets => StrategyDescriptor {
                excludes_known_owners: true,
                ..StrategyDescriptor::new("Learn-New-Secrets", R::Uniform)
            },
            Self::Bubble => StrategyDescriptor::new("Bubble", R::Bubble),
            Self::Mathematical => StrategyDescriptor::new("Mathematical", R::Mathematical),
            Self::Token => StrategyDescriptor {
                uses_token: true,
                ..StrategyDescriptor::new("Token", R::Uniform)
            },
            Self::Spider => StrategyDescriptor {
                uses_spider_token: true,
                ..StrategyDescriptor::new("Spider", R::Uniform)
            },
            Self::TokenImproved => StrategyDescriptor {
                uses_token: true,
                excludes_believed_complete: true,
                ..StrategyDescriptor::new("Token-improved", R::Uniform)
            },
            Self::SpiderImproved => StrategyDescriptor {
                uses_spider_token: true,
                excludes_believed_complete: true,
                ..StrategyDescriptor::new("Spider-improved", R::Uniform)
            },
            Self::CallMinSecrets => StrategyDescriptor::new("Call-Min-Secrets", R::MinBelief),
            Self::CallMaxSecrets => StrategyDescriptor::new("Call-Max-Secrets", R::MaxBelief),
            Self::CallBestSecrets => StrategyDescriptor::new("Call-Best-Secrets", R::BestBelief),
            Self::Divide => StrategyDescriptor {
                assigns_targets: true,
                ..StrategyDescriptor::new("Divide", R::Divide)
            },
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = SimError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| SimError::UnknownStrategy(s.to_string()))
    }
}

impl TryFrom<String> for Strategy {
    type Error = SimError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

enum Choice {
    Peer(AgentId),
    /// Nothing matched; fall back to a uniform pick.
    NoMatch,
    /// Deliberately stay idle this round.
    Idle,
}

/// Pick one peer from a shuffled, non-empty `pool`.
///
/// Returns `Ok(None)` when the strategy decides to stay idle (a Bubble miss).
///
/// # Errors
///
/// Returns [`SimError::ProbeExhausted`] if the Mathematical probe cannot find
/// any pool member, which only happens when the pool is empty.
pub fn select_peer(
    strategy: Strategy,
    caller: &Agent,
    pool: &[AgentId],
    round: u64,
    population: usize,
    rng: &mut DeterministicRng,
) -> Result<Option<AgentId>> {
    let choice = match strategy.descriptor().rule {
        SelectionRule::Uniform => Choice::NoMatch,
        SelectionRule::Bubble => match bubble_partner(caller.id(), round, population) {
            Some(partner) if pool.contains(&partner) => Choice::Peer(partner),
            _ => Choice::Idle,
        },
        SelectionRule::Mathematical => {
            Choice::Peer(mathematical_probe(caller.id(), round, pool, population)?)
        }
        SelectionRule::MinBelief => min_belief(caller, pool.iter().copied()),
        SelectionRule::MaxBelief => max_belief(caller, pool.iter().copied()),
        SelectionRule::BestBelief => {
            if caller.is_complete() {
                min_belief(caller, pool.iter().copied())
            } else {
                let recent = caller.recent_peers();
                max_belief(
                    caller,
                    pool.iter().copied().filter(|peer| !recent.contains(peer)),
                )
            }
        }
        SelectionRule::Divide => divide_choice(caller, pool),
    };

    match choice {
        Choice::Peer(peer) => Ok(Some(peer)),
        Choice::Idle => {
            trace!(caller = caller.id(), round, "strategy chose to stay idle");
            Ok(None)
        }
        Choice::NoMatch => Ok(rng.choose(pool).copied()),
    }
}

/// Hypercube partner of `id` in `round`, if it is a valid agent id.
///
/// With offset `2^round`, ids whose residue modulo `2^(round+1)` is at most
/// half the offset look upward, all others look downward.
#[must_use]
pub fn bubble_partner(id: AgentId, round: u64, population: usize) -> Option<AgentId> {
    let shift = u32::try_from(round).ok()?;
    let offset = 1_usize.checked_shl(shift)?;
    let residue = offset.checked_mul(2).map_or(id, |modulus| id % modulus);
    let partner = if residue <= offset / 2 {
        id.checked_add(offset)?
    } else {
        id.checked_sub(offset)?
    };
    (partner < population).then_some(partner)
}

/// Starting index of the Mathematical probe: `(id+1)*(round+2)-1 mod N`.
#[must_use]
pub fn mathematical_start(id: AgentId, round: u64, population: usize) -> usize {
    if population == 0 {
        return 0;
    }
    let n = population as u128;
    let product = ((id as u128 + 1) % n) * ((u128::from(round) + 2) % n) % n;
    let start = (product + n - 1) % n;
    usize::try_from(start).unwrap_or(0)
}

fn mathematical_probe(
    caller: AgentId,
    round: u64,
    pool: &[AgentId],
    population: usize,
) -> Result<AgentId> {
    let start = mathematical_start(caller, round, population);
    let mut in_pool = vec![false; population];
    for &peer in pool {
        if let Some(slot) = in_pool.get_mut(peer) {
            *slot = true;
        }
    }

    (0..population)
        .map(|offset| (start + offset) % population)
        .find(|&candidate| in_pool[candidate])
        .ok_or(SimError::ProbeExhausted {
            caller,
            start,
            agent_count: population,
        })
}

// Strict comparisons keep the first best candidate in shuffle order.

fn min_belief(caller: &Agent, candidates: impl Iterator<Item = AgentId>) -> Choice {
    let mut best: Option<(AgentId, usize)> = None;
    for peer in candidates {
        let belief = caller.belief_about(peer);
        if best.is_none_or(|(_, lowest)| belief < lowest) {
            best = Some((peer, belief));
        }
    }
    best.map_or(Choice::NoMatch, |(peer, _)| Choice::Peer(peer))
}

fn max_belief(caller: &Agent, candidates: impl Iterator<Item = AgentId>) -> Choice {
    let mut best: Option<(AgentId, usize)> = None;
    for peer in candidates {
        let belief = caller.belief_about(peer);
        if best.is_none_or(|(_, highest)| belief > highest) {
            best = Some((peer, belief));
        }
    }
    best.map_or(Choice::NoMatch, |(peer, _)| Choice::Peer(peer))
}

fn divide_choice(caller: &Agent, pool: &[AgentId]) -> Choice {
    if let Some(&peer) = pool.iter().find(|&&peer| caller.targets_satisfied(peer)) {
        return Choice::Peer(peer);
    }
    let pending = caller.pending_targets();
    pool.iter()
        .find(|peer| pending.contains_key(peer))
        .map_or(Choice::NoMatch, |&peer| Choice::Peer(peer))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn agent_with_beliefs(id: AgentId, beliefs: &[usize]) -> Agent {
        let mut agent = Agent::new(id, beliefs.len());
        agent.merge_belief(beliefs);
        agent
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>(), Ok(strategy));
        }
        assert_eq!("mathematical".parse::<Strategy>(), Ok(Strategy::Mathematical));
        assert_eq!("call_me_once".parse::<Strategy>(), Ok(Strategy::CallMeOnce));
    }

    #[test]
    fn unknown_strategy_is_a_configuration_error() {
        let err = "Shout".parse::<Strategy>().expect_err("should reject");
        assert!(err.is_configuration());
        assert_eq!(err, SimError::UnknownStrategy("Shout".into()));
    }

    #[test]
    fn token_capabilities_are_explicit_flags() {
        let gated: Vec<_> = Strategy::ALL
            .into_iter()
            .filter(|s| s.descriptor().is_token_gated())
            .collect();
        assert_eq!(
            gated,
            vec![
                Strategy::Token,
                Strategy::Spider,
                Strategy::TokenImproved,
                Strategy::SpiderImproved
            ]
        );
        assert!(Strategy::TokenImproved.descriptor().uses_token);
        assert!(!Strategy::TokenImproved.descriptor().uses_spider_token);
        assert!(Strategy::SpiderImproved.descriptor().uses_spider_token);
    }

    #[test]
    fn serde_uses_historical_names() {
        let json = serde_json::to_string(&Strategy::CallBestSecrets).expect("serialize");
        assert_eq!(json, "\"Call-Best-Secrets\"");
        let parsed: Strategy = serde_json::from_str("\"Token-improved\"").expect("deserialize");
        assert_eq!(parsed, Strategy::TokenImproved);
    }

    #[test]
    fn serde_accepts_the_from_str_spellings() {
        for raw in ["\"token_improved\"", "\"TOKEN-IMPROVED\"", "\" Token-improved \""] {
            let parsed: Strategy = serde_json::from_str(raw).expect(raw);
            assert_eq!(parsed, Strategy::TokenImproved);
        }
        let err = serde_json::from_str::<Strategy>("\"Telepathy\"").expect_err("unknown name");
        assert!(err.to_string().contains("unknown strategy"), "{err}");
    }

    #[test]
    fn bubble_round_zero_pairs_neighbours() {
        let partners: Vec<_> = (0..8).map(|id| bubble_partner(id, 0, 8)).collect();
        assert_eq!(
            partners,
            vec![
                Some(1),
                Some(0),
                Some(3),
                Some(2),
                Some(5),
                Some(4),
                Some(7),
                Some(6)
            ]
        );
    }

    #[test]
    fn bubble_round_one_uses_offset_two() {
        let partners: Vec<_> = (0..8).map(|id| bubble_partner(id, 1, 8)).collect();
        assert_eq!(
            partners,
            vec![
                Some(2),
                Some(3),
                Some(0),
                Some(1),
                Some(6),
                Some(7),
                Some(4),
                Some(5)
            ]
        );
    }

    #[test]
    fn bubble_out_of_range_partner_is_none() {
        assert_eq!(bubble_partner(4, 0, 5), None);
        assert_eq!(bubble_partner(0, 3, 8), None);
        assert_eq!(bubble_partner(0, 200, 8), None);
    }

    #[test]
    fn bubble_idles_when_partner_not_in_pool() {
        let caller = Agent::new(0, 8);
        let mut rng = DeterministicRng::new(1);
        let picked =
            select_peer(Strategy::Bubble, &caller, &[2, 3, 4], 0, 8, &mut rng).expect("select");
        assert_eq!(picked, None);
    }

    #[test]
    fn mathematical_start_matches_formula() {
        // (2+1)*(0+2)-1 = 5
        assert_eq!(mathematical_start(2, 0, 10), 5);
        // (4+1)*(3+2)-1 = 24 mod 7 = 3
        assert_eq!(mathematical_start(4, 3, 7), 3);
        // (0+1)*(0+2)-1 = 1
        assert_eq!(mathematical_start(0, 0, 4), 1);
    }

    #[test]
    fn mathematical_probe_wraps_around() {
        let caller = Agent::new(2, 6);
        let mut rng = DeterministicRng::new(1);
        // start = 3*2-1 = 5, not in pool; wraps to 0.
        let picked = select_peer(Strategy::Mathematical, &caller, &[1, 0], 0, 6, &mut rng)
            .expect("select");
        assert_eq!(picked, Some(0));
    }

    #[test]
    fn mathematical_probe_on_empty_pool_is_fatal() {
        let caller = Agent::new(0, 4);
        let mut rng = DeterministicRng::new(1);
        let err = select_peer(Strategy::Mathematical, &caller, &[], 0, 4, &mut rng)
            .expect_err("empty pool must not loop");
        assert!(matches!(err, SimError::ProbeExhausted { caller: 0, .. }));
        assert!(!err.is_configuration());
    }

    #[test]
    fn max_and_min_break_ties_by_pool_order() {
        let caller = agent_with_beliefs(0, &[1, 3, 1, 3, 2]);
        let mut rng = DeterministicRng::new(5);

        let max = select_peer(Strategy::CallMaxSecrets, &caller, &[4, 3, 1], 0, 5, &mut rng)
            .expect("select");
        assert_eq!(max, Some(3));

        let min = select_peer(Strategy::CallMinSecrets, &caller, &[1, 2, 4], 0, 5, &mut rng)
            .expect("select");
        assert_eq!(min, Some(2));
    }

    #[test]
    fn best_secrets_skips_recent_peers_while_incomplete() {
        let mut caller = agent_with_beliefs(0, &[1, 4, 3, 2]);
        caller.record_pairing(1);
        let mut rng = DeterministicRng::new(5);
        let picked = select_peer(Strategy::CallBestSecrets, &caller, &[1, 2, 3], 0, 4, &mut rng)
            .expect("select");
        assert_eq!(picked, Some(2));
    }

    #[test]
    fn best_secrets_calls_least_informed_once_complete() {
        let mut full = agent_with_beliefs(0, &[4, 3, 1, 2]);
        full.stage(&BTreeSet::from([1, 2, 3]));
        full.merge_incoming();
        assert!(full.is_complete());

        let mut rng = DeterministicRng::new(5);
        let picked = select_peer(Strategy::CallBestSecrets, &full, &[1, 3, 2], 0, 4, &mut rng)
            .expect("select");
        assert_eq!(picked, Some(2));
    }

    #[test]
    fn divide_prefers_satisfied_assignment() {
        let mut caller = Agent::new(0, 5);
        caller.assign_targets(3, BTreeSet::from([4]));
        caller.assign_targets(2, BTreeSet::from([1]));
        caller.stage(&BTreeSet::from([1]));
        caller.merge_incoming();

        let mut rng = DeterministicRng::new(5);
        let picked = select_peer(Strategy::Divide, &caller, &[3, 2, 4], 0, 5, &mut rng)
            .expect("select");
        assert_eq!(picked, Some(2));

        // Without a satisfied one, any pending assignment wins.
        let picked =
            select_peer(Strategy::Divide, &caller, &[4, 3], 0, 5, &mut rng).expect("select");
        assert_eq!(picked, Some(3));
    }

    #[test]
    fn uniform_fallback_picks_from_pool() {
        let caller = Agent::new(0, 6);
        let mut rng = DeterministicRng::new(8);
        for _ in 0..20 {
            let picked =
                select_peer(Strategy::Random, &caller, &[2, 5], 0, 6, &mut rng).expect("select");
            assert!(matches!(picked, Some(2 | 5)));
        }
    }
}
