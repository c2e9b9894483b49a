//! Pluggable negotiation hooks and counter-offer strategies.
//!
//! Domain-specific judgement (what an agent needs, how much a request is
//! worth, which style to use against a peer) lives behind
//! [`NegotiationHooks`]. [`DefaultHooks`] is a generic implementation that
//! works from the request and capability alone.

use parley_core::{AgentCapability, AgentId, NegotiationStyle, ResourceMap};

use crate::learner::RejectionLog;
use crate::message::RejectionReason;
use crate::offer::{NegotiationOffer, RequestDetails};
use crate::session::NegotiationRole;

/// Domain hooks consulted by the negotiation engine.
pub trait NegotiationHooks: Send + Sync {
    /// Resources the local agent needs out of `request`.
    fn assess_needs(
        &self,
        role: NegotiationRole,
        request: &RequestDetails,
        capability: &AgentCapability,
    ) -> ResourceMap;

    /// Estimated benefit in `[0, 1]` of taking part in `request`.
    fn potential_benefit(
        &self,
        request: &RequestDetails,
        offer: Option<&NegotiationOffer>,
        capability: &AgentCapability,
    ) -> f64;

    /// Style to use for counter-offers to `peer`.
    fn select_strategy(
        &self,
        peer: &AgentId,
        capability: &AgentCapability,
        rejections: &RejectionLog,
    ) -> NegotiationStyle;
}

/// Hooks that need no domain knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultHooks {
    stalemate_limit: u32,
}

impl DefaultHooks {
    /// Creates hooks that turn cooperative after `stalemate_limit`
    /// `max_rounds_exceeded` rejections from the same peer.
    #[must_use]
    pub const fn new(stalemate_limit: u32) -> Self {
        Self { stalemate_limit }
    }
}

impl Default for DefaultHooks {
    fn default() -> Self {
        Self::new(2)
    }
}

impl NegotiationHooks for DefaultHooks {
    /// The initiator needs what it asked for; the responder needs what it is
    /// expected to get back.
    fn assess_needs(
        &self,
        role: NegotiationRole,
        request: &RequestDetails,
        _capability: &AgentCapability,
    ) -> ResourceMap {
        match role {
            NegotiationRole::Initiator => request.resources_needed.clone(),
            NegotiationRole::Responder => request.resources_in_return.clone(),
        }
    }

    /// `0.4 + 0.3 * priority + 0.3 * expertise match`.
    fn potential_benefit(
        &self,
        request: &RequestDetails,
        offer: Option<&NegotiationOffer>,
        capability: &AgentCapability,
    ) -> f64 {
        let priority = offer.map_or(request.priority, NegotiationOffer::priority);
        let expertise = capability.expertise_match_fraction(&request.required_expertise);
        0.3f64.mul_add(expertise, 0.3f64.mul_add(priority, 0.4)).clamp(0.0, 1.0)
    }

    fn select_strategy(
        &self,
        peer: &AgentId,
        capability: &AgentCapability,
        rejections: &RejectionLog,
    ) -> NegotiationStyle {
        match capability.negotiation_style() {
            NegotiationStyle::Adaptive => {
                if rejections.count(peer, RejectionReason::MaxRoundsExceeded) >= self.stalemate_limit {
                    NegotiationStyle::Cooperative
                } else if capability.trust(peer).is_poor() {
                    NegotiationStyle::Competitive
                } else {
                    NegotiationStyle::Adaptive
                }
            }
            fixed => fixed,
        }
    }
}

/// Multipliers applied to availability and need when forming a counter-offer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyFactors {
    /// Fraction of effective availability offered.
    pub offer: f64,
    /// Fraction of need requested.
    pub request: f64,
}

impl StrategyFactors {
    /// Factors for `style` against a peer trusted at `trust`.
    #[must_use]
    pub fn for_style(style: NegotiationStyle, trust: f64) -> Self {
        match style {
            NegotiationStyle::Cooperative => Self {
                offer: 0.8,
                request: 0.7,
            },
            NegotiationStyle::Competitive => Self {
                offer: 0.4,
                request: 1.2,
            },
            NegotiationStyle::Adaptive => Self {
                offer: 0.4f64.mul_add(trust, 0.4),
                request: (-0.3f64).mul_add(trust, 1.0),
            },
        }
    }
}
