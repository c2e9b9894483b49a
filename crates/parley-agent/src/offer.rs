//! Offer model.
//!
//! A [`NegotiationOffer`] is one side's proposal for one round. Offers are
//! immutable: the only way to produce one is [`OfferBuilder::build`], and
//! every later round creates a fresh offer.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use parley_core::{AgentId, Constraint, ResourceMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an offer.
pub type OfferId = Uuid;

/// Unique identifier for an agreement.
pub type AgreementId = Uuid;

/// Unique identifier for a negotiation session.
pub type NegotiationId = Uuid;

/// What the negotiation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationType {
    /// Sharing capacity such as processing slots.
    ResourceAllocation,
    /// Handing a task to a specialist.
    #[default]
    TaskAssignment,
    /// Exchanging findings or data.
    InformationSharing,
    /// Reconciling conflicting conclusions.
    ConflictResolution,
    /// Working a case jointly.
    CollaborativeAnalysis,
    /// Moving work off an overloaded agent.
    WorkloadBalancing,
}

impl NegotiationType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceAllocation => "resource_allocation",
            Self::TaskAssignment => "task_assignment",
            Self::InformationSharing => "information_sharing",
            Self::ConflictResolution => "conflict_resolution",
            Self::CollaborativeAnalysis => "collaborative_analysis",
            Self::WorkloadBalancing => "workload_balancing",
        }
    }
}

impl fmt::Display for NegotiationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_priority() -> f64 {
    0.5
}

fn default_timeline() -> String {
    "immediate".to_string()
}

/// What the initiator wants, as sent in a `negotiation_request` or invite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    /// Free-form task description.
    #[serde(default)]
    pub task: Option<String>,
    /// Resources the initiator needs from the responder.
    #[serde(default)]
    pub resources_needed: ResourceMap,
    /// Resources the responder is expected to want back.
    #[serde(default)]
    pub resources_in_return: ResourceMap,
    /// Expertise the responder must have at least some of.
    #[serde(default)]
    pub required_expertise: Vec<String>,
    /// Priority in `[0, 1]`.
    #[serde(default = "default_priority")]
    pub priority: f64,
    /// When the work should happen.
    #[serde(default = "default_timeline")]
    pub timeline: String,
    /// How success is judged.
    #[serde(default)]
    pub success_criteria: Vec<String>,
    /// Workload the task owner takes on once the agreement executes.
    #[serde(default)]
    pub workload_increase: f64,
}

impl Default for RequestDetails {
    fn default() -> Self {
        Self {
            task: None,
            resources_needed: ResourceMap::new(),
            resources_in_return: ResourceMap::new(),
            required_expertise: Vec::new(),
            priority: default_priority(),
            timeline: default_timeline(),
            success_criteria: Vec::new(),
            workload_increase: 0.0,
        }
    }
}

impl RequestDetails {
    /// Creates a request for `task` with default priority.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: Some(task.into()),
            ..Self::default()
        }
    }

    /// Sets the resources needed.
    #[must_use]
    pub fn needing(mut self, resources: ResourceMap) -> Self {
        self.resources_needed = resources;
        self
    }

    /// Sets the resources expected in return.
    #[must_use]
    pub fn in_return(mut self, resources: ResourceMap) -> Self {
        self.resources_in_return = resources;
        self
    }

    /// Adds a required expertise area.
    #[must_use]
    pub fn requiring(mut self, area: impl Into<String>) -> Self {
        self.required_expertise.push(area.into());
        self
    }

    /// Sets the priority, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = clamp_unit(priority);
        self
    }

    /// Sets the workload increase for the task owner.
    #[must_use]
    pub fn with_workload_increase(mut self, increase: f64) -> Self {
        self.workload_increase = clamp_unit(increase);
        self
    }
}

/// Structured payload describing the proposed exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Task being negotiated.
    pub task: Option<String>,
    /// Resources the author gives.
    pub offered: ResourceMap,
    /// Resources the author asks for.
    pub requested: ResourceMap,
    /// When the work happens.
    pub timeline: String,
    /// How success is judged.
    pub success_criteria: Vec<String>,
}

impl Proposal {
    /// Describes an exchange for `request`.
    #[must_use]
    pub fn for_exchange(request: &RequestDetails, offered: &ResourceMap, requested: &ResourceMap) -> Self {
        Self {
            task: request.task.clone(),
            offered: offered.clone(),
            requested: requested.clone(),
            timeline: request.timeline.clone(),
            success_criteria: request.success_criteria.clone(),
        }
    }
}

/// An immutable proposal from one agent to another for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationOffer {
    offer_id: OfferId,
    from_agent: AgentId,
    to_agent: AgentId,
    negotiation_type: NegotiationType,
    proposal: Proposal,
    resources_requested: ResourceMap,
    resources_offered: ResourceMap,
    constraints: BTreeSet<Constraint>,
    priority: f64,
    confidence: f64,
    deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl NegotiationOffer {
    /// Starts building an offer from `from` to `to`.
    #[must_use]
    pub fn builder(from: AgentId, to: AgentId, negotiation_type: NegotiationType) -> OfferBuilder {
        OfferBuilder::new(from, to, negotiation_type)
    }

    /// Unique id of this offer.
    #[must_use]
    pub const fn offer_id(&self) -> OfferId {
        self.offer_id
    }

    /// Author of the offer.
    #[must_use]
    pub const fn from_agent(&self) -> &AgentId {
        &self.from_agent
    }

    /// Recipient of the offer.
    #[must_use]
    pub const fn to_agent(&self) -> &AgentId {
        &self.to_agent
    }

    /// Negotiation type.
    #[must_use]
    pub const fn negotiation_type(&self) -> NegotiationType {
        self.negotiation_type
    }

    /// Structured payload.
    #[must_use]
    pub const fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    /// What the author asks for.
    #[must_use]
    pub const fn resources_requested(&self) -> &ResourceMap {
        &self.resources_requested
    }

    /// What the author gives.
    #[must_use]
    pub const fn resources_offered(&self) -> &ResourceMap {
        &self.resources_offered
    }

    /// Conditions attached by the author.
    #[must_use]
    pub const fn constraints(&self) -> &BTreeSet<Constraint> {
        &self.constraints
    }

    /// Priority in `[0, 1]`.
    #[must_use]
    pub const fn priority(&self) -> f64 {
        self.priority
    }

    /// Author's confidence in `[0, 1]`.
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// When the offer lapses.
    #[must_use]
    pub const fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// When the offer was made.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns true once `now` is past the offer's deadline.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

/// Builder for [`NegotiationOffer`].
#[derive(Debug, Clone)]
pub struct OfferBuilder {
    from: AgentId,
    to: AgentId,
    negotiation_type: NegotiationType,
    proposal: Option<Proposal>,
    requested: ResourceMap,
    offered: ResourceMap,
    constraints: BTreeSet<Constraint>,
    priority: f64,
    confidence: f64,
    lifetime: Duration,
}

impl OfferBuilder {
    fn new(from: AgentId, to: AgentId, negotiation_type: NegotiationType) -> Self {
        Self {
            from,
            to,
            negotiation_type,
            proposal: None,
            requested: ResourceMap::new(),
            offered: ResourceMap::new(),
            constraints: BTreeSet::new(),
            priority: default_priority(),
            confidence: 0.5,
            lifetime: Duration::minutes(5),
        }
    }

    /// Resources asked for.
    #[must_use]
    pub fn requested(mut self, resources: ResourceMap) -> Self {
        self.requested = resources;
        self
    }

    /// Resources given.
    #[must_use]
    pub fn offered(mut self, resources: ResourceMap) -> Self {
        self.offered = resources;
        self
    }

    /// Structured payload. Defaults to the bare resource exchange.
    #[must_use]
    pub fn proposal(mut self, proposal: Proposal) -> Self {
        self.proposal = Some(proposal);
        self
    }

    /// Attached constraints.
    #[must_use]
    pub fn constraints(mut self, constraints: BTreeSet<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Priority, clamped to `[0, 1]`.
    #[must_use]
    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = clamp_unit(priority);
        self
    }

    /// Confidence, clamped to `[0, 1]`.
    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    /// How long the offer stays valid after creation.
    #[must_use]
    pub const fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Builds the offer, stamped at `now`.
    #[must_use]
    pub fn build(self, now: DateTime<Utc>) -> NegotiationOffer {
        let proposal = self.proposal.unwrap_or_else(|| Proposal {
            offered: self.offered.clone(),
            requested: self.requested.clone(),
            timeline: default_timeline(),
            ..Proposal::default()
        });
        NegotiationOffer {
            offer_id: Uuid::new_v4(),
            from_agent: self.from,
            to_agent: self.to,
            negotiation_type: self.negotiation_type,
            proposal,
            resources_requested: self.requested,
            resources_offered: self.offered,
            constraints: self.constraints,
            priority: self.priority,
            confidence: self.confidence,
            deadline: now + self.lifetime,
            created_at: now,
        }
    }
}

/// Terms both sides execute once an offer is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    /// Unique id of the agreement.
    pub agreement_id: AgreementId,
    /// Session the agreement closes.
    pub negotiation_id: NegotiationId,
    /// The accepted offer.
    pub terms: NegotiationOffer,
    /// Agent that performs the negotiated task.
    pub task_owner: AgentId,
    /// Workload the task owner takes on.
    pub workload_increase: f64,
    /// When the offer was accepted.
    pub accepted_at: DateTime<Utc>,
}

impl Agreement {
    /// Creates an agreement accepting `terms`.
    #[must_use]
    pub fn new(
        negotiation_id: NegotiationId,
        terms: NegotiationOffer,
        task_owner: AgentId,
        workload_increase: f64,
        accepted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agreement_id: Uuid::new_v4(),
            negotiation_id,
            terms,
            task_owner,
            workload_increase: clamp_unit(workload_increase),
            accepted_at,
        }
    }

    /// Resources `agent` must hand over under this agreement.
    ///
    /// The offer's author gives what it offered; the acceptor gives what the
    /// author requested. Anyone else commits nothing.
    #[must_use]
    pub fn commitment_for(&self, agent: &AgentId) -> ResourceMap {
        if agent == self.terms.from_agent() {
            self.terms.resources_offered().clone()
        } else if agent == self.terms.to_agent() {
            self.terms.resources_requested().clone()
        } else {
            ResourceMap::new()
        }
    }

    /// The other party from `agent`'s point of view.
    #[must_use]
    pub fn counterparty_of(&self, agent: &AgentId) -> &AgentId {
        if agent == self.terms.from_agent() {
            self.terms.to_agent()
        } else {
            self.terms.from_agent()
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ResourceKind;

    fn agent(name: &str) -> AgentId {
        AgentId::new(name).unwrap()
    }

    fn cpu() -> ResourceKind {
        ResourceKind::new("cpu_slots").unwrap()
    }

    fn offer(now: DateTime<Utc>) -> NegotiationOffer {
        NegotiationOffer::builder(agent("fraud_agent"), agent("policy_agent"), NegotiationType::TaskAssignment)
            .offered(ResourceMap::new().with(cpu(), 3.0))
            .requested(ResourceMap::new().with(cpu(), 1.0))
            .priority(1.4)
            .confidence(0.9)
            .lifetime(Duration::minutes(2))
            .build(now)
    }

    #[test]
    fn builder_clamps_and_stamps() {
        let now = Utc::now();
        let offer = offer(now);
        assert_eq!(offer.priority(), 1.0);
        assert!((offer.confidence() - 0.9).abs() < f64::EPSILON);
        assert_eq!(offer.created_at(), now);
        assert_eq!(offer.deadline(), now + Duration::minutes(2));
        assert_eq!(offer.proposal().offered.get(&cpu()), 3.0);
    }

    #[test]
    fn offer_expiry() {
        let now = Utc::now();
        let offer = offer(now);
        assert!(!offer.is_expired(now));
        assert!(!offer.is_expired(now + Duration::minutes(2)));
        assert!(offer.is_expired(now + Duration::minutes(3)));
    }

    #[test]
    fn agreement_commitments_by_side() {
        let now = Utc::now();
        let agreement = Agreement::new(Uuid::new_v4(), offer(now), agent("policy_agent"), 0.1, now);

        assert_eq!(agreement.commitment_for(&agent("fraud_agent")).get(&cpu()), 3.0);
        assert_eq!(agreement.commitment_for(&agent("policy_agent")).get(&cpu()), 1.0);
        assert!(agreement.commitment_for(&agent("bystander")).is_empty());
        assert_eq!(agreement.counterparty_of(&agent("fraud_agent")), &agent("policy_agent"));
    }

    #[test]
    fn request_details_defaults_from_sparse_json() {
        let request: RequestDetails = serde_json::from_str(r#"{"task": "verify_policy"}"#).unwrap();
        assert_eq!(request.task.as_deref(), Some("verify_policy"));
        assert!((request.priority - 0.5).abs() < f64::EPSILON);
        assert_eq!(request.timeline, "immediate");
        assert!(request.resources_needed.is_empty());
    }

    #[test]
    fn negotiation_type_wire_names() {
        let json = serde_json::to_string(&NegotiationType::CollaborativeAnalysis).unwrap();
        assert_eq!(json, "\"collaborative_analysis\"");
        assert_eq!(NegotiationType::WorkloadBalancing.to_string(), "workload_balancing");
    }
}
