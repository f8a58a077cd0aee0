use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Stable identifier for a simulated agent (its index in the population).
pub type AgentId = usize;

/// Identifier of a secret. Agent `i` owns secret `i`.
pub type SecretId = usize;

/// How many recent peers an agent remembers for anti-thrash rules.
pub const RECENT_PEER_WINDOW: usize = 5;

/// Read-only projection of an agent handed to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Agent identity.
    pub id: AgentId,
    /// Number of secrets currently known.
    pub known_count: usize,
    /// Secrets currently known (always includes the agent's own).
    pub known: BTreeSet<SecretId>,
    /// Whether the agent may initiate a call under token-gated strategies.
    pub has_token: bool,
    /// Tokens currently held.
    pub tokens: usize,
}

/// Elementwise-max merge of `other` into `target`.
///
/// Beliefs are themselves gossiped: after two agents interact each holds the
/// larger estimate for every slot. Extra trailing slots in either vector are
/// left untouched.
pub fn merge_beliefs(target: &mut [usize], other: &[usize]) {
    for (mine, theirs) in target.iter_mut().zip(other) {
        if *theirs > *mine {
            *mine = *theirs;
        }
    }
}

/// One participant in the gossip population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    id: AgentId,
    population: usize,
    known: BTreeSet<SecretId>,
    incoming: BTreeSet<SecretId>,
    belief: Vec<usize>,
    tokens: usize,
    permanent_peers: BTreeSet<AgentId>,
    recent_peers: VecDeque<AgentId>,
    pending_targets: BTreeMap<AgentId, BTreeSet<SecretId>>,
}

impl Agent {
    /// Create an agent that knows only its own secret and holds one token.
    #[must_use]
    pub fn new(id: AgentId, population: usize) -> Self {
        let mut belief = vec![0; population];
        if let Some(own) = belief.get_mut(id) {
            *own = 1;
        }
        Self {
            id,
            population,
            known: BTreeSet::from([id]),
            incoming: BTreeSet::new(),
            belief,
            tokens: 1,
            permanent_peers: BTreeSet::new(),
            recent_peers: VecDeque::with_capacity(RECENT_PEER_WINDOW),
            pending_targets: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Secrets known as of the start of the current round.
    #[must_use]
    pub fn known(&self) -> &BTreeSet<SecretId> {
        &self.known
    }

    /// Secrets received this round, not yet merged.
    #[must_use]
    pub fn incoming(&self) -> &BTreeSet<SecretId> {
        &self.incoming
    }

    #[must_use]
    pub fn knows(&self, secret: SecretId) -> bool {
        self.known.contains(&secret)
    }

    #[must_use]
    pub fn belief(&self) -> &[usize] {
        &self.belief
    }

    /// Believed number of secrets `agent` knows (0 when unknown).
    #[must_use]
    pub fn belief_about(&self, agent: AgentId) -> usize {
        self.belief.get(agent).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.tokens > 0
    }

    #[must_use]
    pub fn tokens(&self) -> usize {
        self.tokens
    }

    #[must_use]
    pub fn permanent_peers(&self) -> &BTreeSet<AgentId> {
        &self.permanent_peers
    }

    #[must_use]
    pub fn recent_peers(&self) -> &VecDeque<AgentId> {
        &self.recent_peers
    }

    #[must_use]
    pub fn pending_targets(&self) -> &BTreeMap<AgentId, BTreeSet<SecretId>> {
        &self.pending_targets
    }

    /// `true` once the agent knows every secret in the population.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.known.len() == self.population
    }

    /// Stage secrets received from a peer; they become visible at round end.
    pub fn stage(&mut self, secrets: &BTreeSet<SecretId>) {
        self.incoming.extend(secrets.iter().copied());
    }

    /// Fold the staging area into `known` and refresh the self-estimate.
    pub fn merge_incoming(&mut self) {
        self.known.append(&mut self.incoming);
        let count = self.known.len();
        if let Some(own) = self.belief.get_mut(self.id) {
            *own = count;
        }
    }

    /// Elementwise-max merge of a peer's belief vector into ours.
    pub fn merge_belief(&mut self, other: &[usize]) {
        merge_beliefs(&mut self.belief, other);
    }

    /// Remember `peer` permanently and in the bounded recent window.
    pub fn record_pairing(&mut self, peer: AgentId) {
        self.permanent_peers.insert(peer);
        if self.recent_peers.len() == RECENT_PEER_WINDOW {
            self.recent_peers.pop_front();
        }
        self.recent_peers.push_back(peer);
    }

    /// Move one token from `self` to `to`. Does nothing if `self` holds none.
    pub fn transfer_token(&mut self, to: &mut Agent) {
        if self.tokens == 0 {
            return;
        }
        self.tokens -= 1;
        to.tokens += 1;
    }

    /// Replace the Divide assignment for `peer`; an empty set clears it.
    pub fn assign_targets(&mut self, peer: AgentId, secrets: BTreeSet<SecretId>) {
        if secrets.is_empty() {
            self.pending_targets.remove(&peer);
        } else {
            self.pending_targets.insert(peer, secrets);
        }
    }

    /// `true` if the secrets assigned for `peer` are all known now.
    #[must_use]
    pub fn targets_satisfied(&self, peer: AgentId) -> bool {
        self.pending_targets
            .get(&peer)
            .is_some_and(|targets| targets.is_subset(&self.known))
    }

    #[must_use]
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            known_count: self.known.len(),
            known: self.known.clone(),
            has_token: self.has_token(),
            tokens: self.tokens,
        }
    }
}
