use std::collections::{BTreeMap, BTreeSet};

use crate::agent::{AgentId, AgentSnapshot, SecretId};
use crate::campaign::RunTrace;
use crate::round::Pairing;

// ── Core result types ─────────────────────────────────────────────────────────

/// Oracle result for an invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    /// Every invariant that was violated.
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: OracleResult) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An agent knew fewer secrets after a round than before it.
    KnowledgeLost {
        agent: AgentId,
        round: u64,
        lost: Vec<SecretId>,
    },

    /// An agent holds a secret id outside `0..N`.
    InventedSecret { agent: AgentId, secret: SecretId },

    /// An agent no longer knows its own secret.
    OwnSecretMissing { agent: AgentId },

    /// The run claims to be finished but an agent is missing secrets.
    Incomplete { agent: AgentId, known_count: usize },

    /// The total number of tokens drifted from the population size.
    TokenDrift {
        round: u64,
        total: usize,
        expected: usize,
    },

    /// An agent appears in more than one pairing in a single round.
    DoublePairing { round: u64, agent: AgentId },

    /// Call-Me-Once paired the same two agents twice.
    RepeatedPairing {
        pair: Pairing,
        first_round: u64,
        repeat_round: u64,
    },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KnowledgeLost { agent, round, lost } => {
                write!(f, "Monotonicity: agent {agent} lost {lost:?} in round {round}")
            }
            Self::InventedSecret { agent, secret } => {
                write!(f, "Conservation: agent {agent} knows unknown secret {secret}")
            }
            Self::OwnSecretMissing { agent } => {
                write!(f, "Conservation: agent {agent} forgot its own secret")
            }
            Self::Incomplete { agent, known_count } => write!(
                f,
                "Completion: agent {agent} knows only {known_count} secrets at finish"
            ),
            Self::TokenDrift {
                round,
                total,
                expected,
            } => write!(
                f,
                "TokenConservation: {total} tokens after round {round}, expected {expected}"
            ),
            Self::DoublePairing { round, agent } => {
                write!(f, "Pairing: agent {agent} paired twice in round {round}")
            }
            Self::RepeatedPairing {
                pair,
                first_round,
                repeat_round,
            } => write!(
                f,
                "CallMeOnce: pair {pair:?} repeated in round {repeat_round} (first in round {first_round})"
            ),
        }
    }
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks the gossip invariants over a recorded run.
///
/// # Invariants checked
///
/// 1. **Monotonicity**: `known` never shrinks between rounds.
/// 2. **Conservation**: only secrets `0..N` exist, and owners keep theirs.
/// 3. **Completion**: a finished run has every agent knowing `N` secrets.
/// 4. **Token conservation**: token total stays at `N` every round.
/// 5. **Pairing uniqueness**: no agent pairs twice in one round.
/// 6. **Call-Me-Once exclusivity**: no unordered pair repeats (only when
///    the strategy forbids repeats).
pub struct GossipOracle;

impl GossipOracle {
    /// Report every secret that disappeared between `before` and `after`.
    #[must_use]
    pub fn check_monotonicity(
        before: &[AgentSnapshot],
        after: &[AgentSnapshot],
        round: u64,
    ) -> OracleResult {
        let violations = before
            .iter()
            .zip(after)
            .filter_map(|(prev, next)| {
                let lost: Vec<SecretId> = prev.known.difference(&next.known).copied().collect();
                (!lost.is_empty()).then_some(InvariantViolation::KnowledgeLost {
                    agent: prev.id,
                    round,
                    lost,
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_conservation(states: &[AgentSnapshot], population: usize) -> OracleResult {
        let mut violations = Vec::new();
        for state in states {
            if !state.known.contains(&state.id) {
                violations.push(InvariantViolation::OwnSecretMissing { agent: state.id });
            }
            violations.extend(state.known.range(population..).map(|&secret| {
                InvariantViolation::InventedSecret {
                    agent: state.id,
                    secret,
                }
            }));
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_completion(states: &[AgentSnapshot], population: usize) -> OracleResult {
        let violations = states
            .iter()
            .filter(|state| state.known_count != population)
            .map(|state| InvariantViolation::Incomplete {
                agent: state.id,
                known_count: state.known_count,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_token_conservation(
        states: &[AgentSnapshot],
        expected: usize,
        round: u64,
    ) -> OracleResult {
        let total: usize = states.iter().map(|state| state.tokens).sum();
        if total == expected {
            OracleResult::pass()
        } else {
            OracleResult::from_violations(vec![InvariantViolation::TokenDrift {
                round,
                total,
                expected,
            }])
        }
    }

    #[must_use]
    pub fn check_pairings_unique(pairings: &[Pairing], round: u64) -> OracleResult {
        let mut seen = BTreeSet::new();
        let mut violations = Vec::new();
        for &(a, b) in pairings {
            for agent in [a, b] {
                if !seen.insert(agent) {
                    violations.push(InvariantViolation::DoublePairing { round, agent });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    /// `history[i]` holds the pairings of round `i`.
    #[must_use]
    pub fn check_call_once<'a>(history: impl IntoIterator<Item = &'a [Pairing]>) -> OracleResult {
        let mut first_seen: BTreeMap<Pairing, u64> = BTreeMap::new();
        let mut violations = Vec::new();
        for (round, pairings) in (0_u64..).zip(history) {
            for &(a, b) in pairings {
                let pair = (a.min(b), a.max(b));
                if let Some(&first_round) = first_seen.get(&pair) {
                    violations.push(InvariantViolation::RepeatedPairing {
                        pair,
                        first_round,
                        repeat_round: round,
                    });
                } else {
                    first_seen.insert(pair, round);
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Run every applicable check over a recorded run.
    #[must_use]
    pub fn check_all(trace: &RunTrace) -> OracleResult {
        let population = trace.population;
        let traits = trace.strategy.descriptor();

        let mut result = Self::check_conservation(&trace.initial, population).merge(
            Self::check_token_conservation(&trace.initial, population, 0),
        );

        let mut previous = &trace.initial;
        for record in &trace.rounds {
            result = result
                .merge(Self::check_monotonicity(previous, &record.states, record.round))
                .merge(Self::check_conservation(&record.states, population))
                .merge(Self::check_token_conservation(
                    &record.states,
                    population,
                    record.round,
                ))
                .merge(Self::check_pairings_unique(&record.pairings, record.round));
            previous = &record.states;
        }

        if traits.excludes_permanent_peers {
            result = result.merge(Self::check_call_once(
                trace.rounds.iter().map(|record| record.pairings.as_slice()),
            ));
        }

        let last_round = trace.rounds.last().map_or(0, |record| record.round);
        result = result
            .merge(Self::check_monotonicity(previous, &trace.final_states, last_round))
            .merge(Self::check_conservation(&trace.final_states, population))
            .merge(Self::check_token_conservation(
                &trace.final_states,
                population,
                last_round,
            ));

        if trace.finished {
            result = result.merge(Self::check_completion(&trace.final_states, population));
        }

        result
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
