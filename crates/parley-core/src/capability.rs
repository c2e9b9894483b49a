//! Per-agent capability snapshot.
//!
//! An [`AgentCapability`] is owned by exactly one agent. It records nominal
//! resource capacity, expertise, workload and the agent's relationship scores
//! with its peers. Reads are pure; the only mutations are workload updates,
//! relationship updates and the all-or-nothing [`try_commit`] reservation.
//!
//! [`try_commit`]: AgentCapability::try_commit

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{AgentId, ParleyError, ResourceKind, ResourceMap, Score};

/// How an agent formulates counter-offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStyle {
    /// Generous offers, modest requests.
    Cooperative,
    /// Stingy offers, inflated requests.
    Competitive,
    /// Concession scaled by trust in the peer.
    #[default]
    Adaptive,
}

impl NegotiationStyle {
    /// Returns the wire name of the style.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cooperative => "cooperative",
            Self::Competitive => "competitive",
            Self::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for NegotiationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conditions an agent attaches to its offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// The agent is busy and only takes high priority work.
    HighWorkloadPriorityOnly,
    /// The agent already has many negotiations open.
    LimitedConcurrentNegotiations,
}

/// Thresholds that trigger [`Constraint`]s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintThresholds {
    /// Workload above which `high_workload_priority_only` is emitted.
    pub high_workload: f64,
    /// Open session count above which `limited_concurrent_negotiations` is emitted.
    pub max_concurrent_negotiations: usize,
}

impl Default for ConstraintThresholds {
    fn default() -> Self {
        Self {
            high_workload: 0.7,
            max_concurrent_negotiations: 3,
        }
    }
}

/// An agent's resources, expertise, workload and relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    agent_id: AgentId,
    available_resources: ResourceMap,
    expertise_areas: BTreeSet<String>,
    current_workload: f64,
    collaboration_history: HashMap<AgentId, Score>,
    trust_scores: HashMap<AgentId, Score>,
    negotiation_style: NegotiationStyle,
}

impl AgentCapability {
    /// Starts building a capability for `agent_id`.
    #[must_use]
    pub fn builder(agent_id: AgentId) -> CapabilityBuilder {
        CapabilityBuilder::new(agent_id)
    }

    /// Returns the owning agent's id.
    #[must_use]
    pub const fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Nominal capacity per resource kind.
    #[must_use]
    pub const fn available_resources(&self) -> &ResourceMap {
        &self.available_resources
    }

    /// Areas this agent has expertise in.
    #[must_use]
    pub const fn expertise_areas(&self) -> &BTreeSet<String> {
        &self.expertise_areas
    }

    /// Current workload in `[0, 1]`.
    #[must_use]
    pub const fn current_workload(&self) -> f64 {
        self.current_workload
    }

    /// Configured negotiation style.
    #[must_use]
    pub const fn negotiation_style(&self) -> NegotiationStyle {
        self.negotiation_style
    }

    /// Changes the negotiation style.
    pub fn set_negotiation_style(&mut self, style: NegotiationStyle) {
        self.negotiation_style = style;
    }

    /// Sets the workload, clamped to `[0, 1]`.
    pub fn set_workload(&mut self, workload: f64) {
        self.current_workload = clamp_unit(workload);
    }

    /// Adds `delta` to the workload, clamped to `[0, 1]`.
    pub fn add_workload(&mut self, delta: f64) {
        self.set_workload(self.current_workload + delta);
    }

    /// Effective availability: nominal capacity discounted by workload.
    #[must_use]
    pub fn available_now(&self) -> ResourceMap {
        let free = 1.0 - self.current_workload;
        self.available_resources.scaled(free)
    }

    /// Effective availability of a single kind.
    #[must_use]
    pub fn available_now_of(&self, kind: &ResourceKind) -> f64 {
        self.available_resources.get(kind) * (1.0 - self.current_workload)
    }

    /// Trust in `peer`, neutral if unknown.
    #[must_use]
    pub fn trust(&self, peer: &AgentId) -> Score {
        self.trust_scores.get(peer).copied().unwrap_or_default()
    }

    /// Collaboration success rate with `peer`, neutral if unknown.
    #[must_use]
    pub fn collaboration(&self, peer: &AgentId) -> Score {
        self.collaboration_history
            .get(peer)
            .copied()
            .unwrap_or_default()
    }

    /// Records trust in `peer`.
    pub fn set_trust(&mut self, peer: AgentId, score: Score) {
        self.trust_scores.insert(peer, score);
    }

    /// Records the collaboration success rate with `peer`.
    pub fn set_collaboration(&mut self, peer: AgentId, score: Score) {
        self.collaboration_history.insert(peer, score);
    }

    /// All known trust scores.
    pub fn trust_scores(&self) -> impl Iterator<Item = (&AgentId, Score)> {
        self.trust_scores.iter().map(|(k, v)| (k, *v))
    }

    /// All known collaboration rates.
    pub fn collaboration_history(&self) -> impl Iterator<Item = (&AgentId, Score)> {
        self.collaboration_history.iter().map(|(k, v)| (k, *v))
    }

    /// Number of `required` areas this agent covers.
    #[must_use]
    pub fn expertise_overlap<S: AsRef<str>>(&self, required: &[S]) -> usize {
        required
            .iter()
            .filter(|area| self.expertise_areas.contains(area.as_ref()))
            .count()
    }

    /// Fraction of `required` areas this agent covers; 1.0 when nothing is required.
    #[must_use]
    pub fn expertise_match_fraction<S: AsRef<str>>(&self, required: &[S]) -> f64 {
        if required.is_empty() {
            return 1.0;
        }
        self.expertise_overlap(required) as f64 / required.len() as f64
    }

    /// Constraints to attach to offers given the number of open sessions.
    #[must_use]
    pub fn generate_constraints(
        &self,
        open_sessions: usize,
        thresholds: &ConstraintThresholds,
    ) -> BTreeSet<Constraint> {
        let mut constraints = BTreeSet::new();
        if self.current_workload > thresholds.high_workload {
            constraints.insert(Constraint::HighWorkloadPriorityOnly);
        }
        if open_sessions > thresholds.max_concurrent_negotiations {
            constraints.insert(Constraint::LimitedConcurrentNegotiations);
        }
        constraints
    }

    /// Reserves and consumes `resources` against effective availability.
    ///
    /// Either every kind is covered and all are deducted from nominal
    /// capacity, or nothing changes.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::InsufficientResources` for the first kind whose
    /// requested amount exceeds its effective availability.
    pub fn try_commit(&mut self, resources: &ResourceMap) -> Result<(), ParleyError> {
        for (kind, requested) in resources.iter() {
            let available = self.available_now_of(kind);
            if requested > available + 1e-9 {
                return Err(ParleyError::InsufficientResources {
                    kind: kind.to_string(),
                    requested,
                    available,
                });
            }
        }

        for (kind, amount) in resources.iter() {
            if self.available_resources.contains(kind) {
                let remaining = self.available_resources.get(kind) - amount;
                self.available_resources.insert(kind.clone(), remaining);
            }
        }
        Ok(())
    }

    /// Returns previously committed `resources` to nominal capacity.
    pub fn release(&mut self, resources: &ResourceMap) {
        for (kind, amount) in resources.iter() {
            let restored = self.available_resources.get(kind) + amount;
            self.available_resources.insert(kind.clone(), restored);
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Builder for [`AgentCapability`].
#[derive(Debug, Clone)]
pub struct CapabilityBuilder {
    agent_id: AgentId,
    resources: ResourceMap,
    expertise: BTreeSet<String>,
    workload: f64,
    style: NegotiationStyle,
    trust: HashMap<AgentId, Score>,
    history: HashMap<AgentId, Score>,
}

impl CapabilityBuilder {
    /// Creates a builder with no resources, no expertise and zero workload.
    #[must_use]
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            resources: ResourceMap::new(),
            expertise: BTreeSet::new(),
            workload: 0.0,
            style: NegotiationStyle::default(),
            trust: HashMap::new(),
            history: HashMap::new(),
        }
    }

    /// Adds nominal capacity for a resource kind.
    #[must_use]
    pub fn resource(mut self, kind: ResourceKind, amount: f64) -> Self {
        self.resources.insert(kind, amount);
        self
    }

    /// Replaces all nominal capacity.
    #[must_use]
    pub fn resources(mut self, resources: ResourceMap) -> Self {
        self.resources = resources;
        self
    }

    /// Adds an expertise area.
    #[must_use]
    pub fn expertise(mut self, area: impl Into<String>) -> Self {
        self.expertise.insert(area.into());
        self
    }

    /// Sets the starting workload.
    #[must_use]
    pub const fn workload(mut self, workload: f64) -> Self {
        self.workload = workload;
        self
    }

    /// Sets the negotiation style.
    #[must_use]
    pub const fn style(mut self, style: NegotiationStyle) -> Self {
        self.style = style;
        self
    }

    /// Seeds trust in a peer.
    #[must_use]
    pub fn trust(mut self, peer: AgentId, score: Score) -> Self {
        self.trust.insert(peer, score);
        self
    }

    /// Seeds the collaboration rate with a peer.
    #[must_use]
    pub fn collaboration(mut self, peer: AgentId, score: Score) -> Self {
        self.history.insert(peer, score);
        self
    }

    /// Builds the capability.
    #[must_use]
    pub fn build(self) -> AgentCapability {
        AgentCapability {
            agent_id: self.agent_id,
            available_resources: self.resources,
            expertise_areas: self.expertise,
            current_workload: clamp_unit(self.workload),
            collaboration_history: self.history,
            trust_scores: self.trust,
            negotiation_style: self.style,
        }
    }
}
