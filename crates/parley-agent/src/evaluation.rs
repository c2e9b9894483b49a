//! Offer formulation and scoring arithmetic.
//!
//! Everything here is a pure function of its inputs: the same capability
//! snapshot and offer always produce the same terms and the same score.

use parley_core::{AgentCapability, AgentId, ResourceMap};
use serde::{Deserialize, Serialize};

use crate::offer::NegotiationOffer;
use crate::strategy::StrategyFactors;

/// Weight of needs satisfaction and of request reasonableness in the raw score.
const COVERAGE_WEIGHT: f64 = 0.4;

/// Weight of trust and of collaboration history in the raw score.
const RELATIONSHIP_WEIGHT: f64 = 0.1;

/// Proposed resource exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Terms {
    /// Resources we give.
    pub offered: ResourceMap,
    /// Resources we ask for.
    pub requested: ResourceMap,
    /// Our confidence in the terms.
    pub confidence: f64,
}

/// Breakdown of an offer's evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfferScore {
    /// Mean coverage of our needs by what is offered.
    pub needs_satisfaction: f64,
    /// How much of what is requested we can actually give.
    pub reasonableness: f64,
    /// `trust * 0.1`.
    pub trust_bonus: f64,
    /// `history * 0.1`.
    pub history_bonus: f64,
    /// The offer's stated confidence.
    pub confidence: f64,
    /// Final score in `[0, 1]`.
    pub value: f64,
}

/// `(trust + history) / 2` towards `peer`.
#[must_use]
pub fn generosity(capability: &AgentCapability, peer: &AgentId) -> f64 {
    f64::midpoint(capability.trust(peer).value(), capability.collaboration(peer).value())
}

/// `0.7 + 0.3 * min(1, total offered / total requested)`; 1.0 when nothing is requested.
#[must_use]
pub fn adequacy_confidence(offered: &ResourceMap, requested: &ResourceMap) -> f64 {
    let wanted = requested.total();
    if wanted <= 0.0 {
        return 1.0;
    }
    let adequacy = (offered.total() / wanted).min(1.0);
    0.3f64.mul_add(adequacy, 0.7)
}

/// Terms for the opening offer to `peer`.
///
/// We offer our effective availability scaled by generosity, restricted to
/// the kinds the peer expects back when it expects anything specific, and
/// ask for exactly what we need.
#[must_use]
pub fn initial_terms(
    capability: &AgentCapability,
    peer: &AgentId,
    expected_in_return: &ResourceMap,
    needs: &ResourceMap,
) -> Terms {
    let available = capability.available_now();
    let pool = if expected_in_return.is_empty() {
        available
    } else {
        restricted(&available, expected_in_return)
    };
    let offered = pool.scaled(generosity(capability, peer));
    let confidence = adequacy_confidence(&offered, needs);
    Terms {
        offered,
        requested: needs.clone(),
        confidence,
    }
}

/// Terms for a counter-offer answering `peer_requested` with our `needs`.
///
/// Offered amounts are a share of effective availability for each kind the
/// peer asked for, never more than the peer asked for and never more than
/// we have.
#[must_use]
pub fn counter_terms(
    capability: &AgentCapability,
    factors: StrategyFactors,
    peer_requested: &ResourceMap,
    needs: &ResourceMap,
) -> Terms {
    let available = capability.available_now();
    let offered = peer_requested
        .map_amounts(|kind, asked| (available.get(kind) * factors.offer).min(asked))
        .clamped_to(&available);
    let requested = needs.scaled(factors.request);
    let confidence = adequacy_confidence(&offered, &requested);
    Terms {
        offered,
        requested,
        confidence,
    }
}

/// Concedes from `last` after it scored `score`.
///
/// `improvement = (1 - score) * concession_rate`; offered amounts grow by
/// `1 + improvement` (re-clamped to `available`), requested amounts shrink by
/// `1 - improvement / 2`.
#[must_use]
pub fn refine_terms(last: &NegotiationOffer, score: f64, concession_rate: f64, available: &ResourceMap) -> Terms {
    let improvement = ((1.0 - score) * concession_rate).clamp(0.0, 1.0);
    let offered = last
        .resources_offered()
        .scaled(1.0 + improvement)
        .clamped_to(available);
    let requested = last
        .resources_requested()
        .scaled(improvement.mul_add(-0.5, 1.0));
    Terms {
        offered,
        requested,
        confidence: (score + improvement).min(1.0),
    }
}

/// Scores `offer` from the point of view of `capability`, whose needs are `needs`.
#[must_use]
pub fn score_offer(capability: &AgentCapability, offer: &NegotiationOffer, needs: &ResourceMap) -> OfferScore {
    let needs_satisfaction = needs_satisfaction(offer.resources_offered(), needs);
    let reasonableness = offer
        .resources_requested()
        .iter()
        .map(|(kind, requested)| coverage(capability.available_now_of(kind), requested))
        .product::<f64>();

    let peer = offer.from_agent();
    let trust_bonus = capability.trust(peer).value() * RELATIONSHIP_WEIGHT;
    let history_bonus = capability.collaboration(peer).value() * RELATIONSHIP_WEIGHT;

    let raw = COVERAGE_WEIGHT.mul_add(
        needs_satisfaction,
        COVERAGE_WEIGHT.mul_add(reasonableness, trust_bonus + history_bonus),
    );
    let confidence = offer.confidence();
    let value = (raw * 0.5f64.mul_add(confidence, 0.5)).clamp(0.0, 1.0);

    OfferScore {
        needs_satisfaction,
        reasonableness,
        trust_bonus,
        history_bonus,
        confidence,
        value,
    }
}

/// Mean of `min(1, offered / needed)` over our needs; 1.0 with no needs.
fn needs_satisfaction(offered: &ResourceMap, needs: &ResourceMap) -> f64 {
    if needs.is_empty() {
        return 1.0;
    }
    let sum: f64 = needs
        .iter()
        .map(|(kind, needed)| coverage(offered.get(kind), needed))
        .sum();
    sum / needs.len() as f64
}

fn coverage(have: f64, want: f64) -> f64 {
    if want <= 0.0 {
        1.0
    } else {
        (have / want).min(1.0)
    }
}

fn restricted(map: &ResourceMap, kinds: &ResourceMap) -> ResourceMap {
    kinds
        .kinds()
        .map(|kind| (kind.clone(), map.get(kind)))
        .collect()
}
