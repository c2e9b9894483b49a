//! Protocol messages exchanged between agents.
//!
//! Every message travels inside an [`Envelope`] and is JSON-serializable with
//! a `kind` tag matching the wire names in [`MessageKind`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use parley_core::{AgentId, ResourceKind, ResourceMap};
use serde::{Deserialize, Serialize};

use crate::offer::{Agreement, NegotiationId, NegotiationOffer, NegotiationType, OfferId, RequestDetails};

/// Inbound message kinds understood by the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Open a session.
    NegotiationRequest,
    /// Advance a round with an offer.
    Offer,
    /// Advance a round with a counter-offer.
    CounterOffer,
    /// Close a session as accepted.
    Acceptance,
    /// Close a session as rejected.
    Rejection,
    /// Ask for current availability.
    ResourceQuery,
    /// Ad-hoc collaboration invitation.
    CollaborationInvite,
}

impl MessageKind {
    /// The fixed dispatch table, in wire order.
    pub const ALL: [Self; 7] = [
        Self::NegotiationRequest,
        Self::Offer,
        Self::CounterOffer,
        Self::Acceptance,
        Self::Rejection,
        Self::ResourceQuery,
        Self::CollaborationInvite,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NegotiationRequest => "negotiation_request",
            Self::Offer => "offer",
            Self::CounterOffer => "counter_offer",
            Self::Acceptance => "acceptance",
            Self::Rejection => "rejection",
            Self::ResourceQuery => "resource_query",
            Self::CollaborationInvite => "collaboration_invite",
        }
    }

    /// Looks up a wire name in the dispatch table.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was closed without agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The receiver declined at the participation gate.
    InsufficientResourcesOrInterest,
    /// The round budget ran out.
    MaxRoundsExceeded,
    /// The reservation step could not cover the commitment.
    ResourcesUnavailable,
    /// The session deadline passed.
    DeadlineExpired,
    /// The peer could not be reached.
    PeerUnreachable,
}

impl RejectionReason {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientResourcesOrInterest => "insufficient_resources_or_interest",
            Self::MaxRoundsExceeded => "max_rounds_exceeded",
            Self::ResourcesUnavailable => "resources_unavailable",
            Self::DeadlineExpired => "deadline_expired",
            Self::PeerUnreachable => "peer_unreachable",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which participation check failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum DeclineReason {
    /// Trust in the sender is too low.
    LowTrust {
        /// Current trust in the sender.
        trust: f64,
    },
    /// A requested resource is not sufficiently available.
    InsufficientResources {
        /// Resource kind.
        kind: ResourceKind,
        /// Effective amount available.
        available: f64,
        /// Amount requested.
        requested: f64,
    },
    /// The receiver is too busy.
    ExcessiveWorkload {
        /// Current workload.
        workload: f64,
    },
    /// None of the required expertise is present.
    NoExpertiseOverlap {
        /// Expertise the request asked for.
        required: Vec<String>,
    },
    /// The estimated benefit is too low.
    InsufficientBenefit {
        /// Estimated benefit.
        benefit: f64,
    },
}

/// Alternatives suggested alongside a decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    /// Take on part of the work.
    PartialCollaboration,
    /// Retry later.
    DelayedExecution,
    /// Share resources without a task handoff.
    ResourceSharing,
}

impl Alternative {
    /// The standard set of alternatives.
    pub const ALL: [Self; 3] = [
        Self::PartialCollaboration,
        Self::DelayedExecution,
        Self::ResourceSharing,
    ];
}

/// Answer to a `resource_query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReport {
    /// Reporting agent.
    pub agent_id: AgentId,
    /// Workload-discounted availability.
    pub available_resources: ResourceMap,
    /// Current workload.
    pub current_workload: f64,
    /// Expertise areas.
    pub expertise_areas: BTreeSet<String>,
}

/// Answer to a `collaboration_invite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum InviteResponse {
    /// The invite is accepted under these conditions.
    Accept {
        /// Conditions attached to the acceptance.
        conditions: Vec<String>,
    },
    /// The invite is declined.
    Decline {
        /// Why.
        reason: String,
        /// Estimated benefit that fell short.
        benefit: f64,
    },
}

impl InviteResponse {
    /// Returns true for an acceptance.
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolMessage {
    /// Open a session.
    NegotiationRequest {
        /// Session id chosen by the initiator.
        negotiation_id: NegotiationId,
        /// Initiator.
        from_agent: AgentId,
        /// Negotiation type.
        #[serde(rename = "type")]
        negotiation_type: NegotiationType,
        /// Initiator's opening offer.
        initial_offer: NegotiationOffer,
        /// Session deadline.
        deadline: DateTime<Utc>,
        /// What is being asked for.
        request_details: RequestDetails,
    },
    /// An offer for the current round.
    Offer {
        /// Session id.
        negotiation_id: NegotiationId,
        /// The offer.
        offer: NegotiationOffer,
    },
    /// A counter-offer for the current round.
    CounterOffer {
        /// Session id.
        negotiation_id: NegotiationId,
        /// The counter-offer.
        offer: NegotiationOffer,
        /// Why the terms were chosen.
        #[serde(default)]
        reasoning: String,
        /// Conditions for accepting.
        #[serde(default)]
        conditions: Vec<String>,
        /// Sender's round counter.
        #[serde(default)]
        round: u32,
    },
    /// The receiver's latest offer was accepted.
    Acceptance {
        /// Session id.
        negotiation_id: NegotiationId,
        /// Executed terms.
        agreement: Agreement,
        /// Acceptor's evaluation score.
        satisfaction_score: f64,
    },
    /// The session is closed without agreement.
    Rejection {
        /// Session id.
        negotiation_id: NegotiationId,
        /// Why.
        reason: RejectionReason,
        /// Which participation check failed, for gate declines.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<DeclineReason>,
        /// Suggested alternatives.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        alternative_suggestions: Vec<Alternative>,
        /// Best score seen before giving up.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        best_offer_score: Option<f64>,
    },
    /// Ask for current availability.
    ResourceQuery,
    /// Ad-hoc collaboration invitation.
    CollaborationInvite {
        /// What the collaboration involves.
        details: RequestDetails,
    },
}

impl ProtocolMessage {
    /// The dispatch table entry for this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::NegotiationRequest { .. } => MessageKind::NegotiationRequest,
            Self::Offer { .. } => MessageKind::Offer,
            Self::CounterOffer { .. } => MessageKind::CounterOffer,
            Self::Acceptance { .. } => MessageKind::Acceptance,
            Self::Rejection { .. } => MessageKind::Rejection,
            Self::ResourceQuery => MessageKind::ResourceQuery,
            Self::CollaborationInvite { .. } => MessageKind::CollaborationInvite,
        }
    }

    /// The session this message belongs to, if any.
    #[must_use]
    pub const fn negotiation_id(&self) -> Option<NegotiationId> {
        match self {
            Self::NegotiationRequest { negotiation_id, .. }
            | Self::Offer { negotiation_id, .. }
            | Self::CounterOffer { negotiation_id, .. }
            | Self::Acceptance { negotiation_id, .. }
            | Self::Rejection { negotiation_id, .. } => Some(*negotiation_id),
            Self::ResourceQuery | Self::CollaborationInvite { .. } => None,
        }
    }

    /// Builds a rejection without gate detail.
    #[must_use]
    pub const fn rejection(negotiation_id: NegotiationId, reason: RejectionReason, best_offer_score: Option<f64>) -> Self {
        Self::Rejection {
            negotiation_id,
            reason,
            detail: None,
            alternative_suggestions: Vec::new(),
            best_offer_score,
        }
    }
}

/// A message addressed from one agent to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender.
    pub from: AgentId,
    /// Recipient.
    pub to: AgentId,
    /// Payload.
    pub message: ProtocolMessage,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub const fn new(from: AgentId, to: AgentId, message: ProtocolMessage) -> Self {
        Self { from, to, message }
    }
}

/// Local result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// The participation gate declined a request.
    Declined {
        /// Failed check.
        reason: DeclineReason,
    },
    /// A counter-offer was sent.
    CounterOffered {
        /// Session id.
        negotiation_id: NegotiationId,
        /// The counter-offer's id.
        offer_id: OfferId,
        /// Our round counter.
        round: u32,
    },
    /// An offer was accepted and the agreement executed.
    Accepted {
        /// Session id.
        negotiation_id: NegotiationId,
        /// Executed agreement.
        agreement: Agreement,
        /// Evaluation score of the accepted offer.
        score: f64,
    },
    /// The session was closed without agreement.
    Rejected {
        /// Session id.
        negotiation_id: NegotiationId,
        /// Why.
        reason: RejectionReason,
    },
    /// The message was applied; nothing further to report.
    Acknowledged,
    /// Current availability.
    Resources(ResourceReport),
    /// Collaboration invite decision.
    Invitation(InviteResponse),
}
