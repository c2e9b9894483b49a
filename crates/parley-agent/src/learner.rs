//! Trust and reputation learning.
//!
//! The learner is the only component that writes relationship scores on an
//! [`AgentCapability`]. Every update goes through [`Score`] arithmetic, so
//! values stay in `[0, 1]`.

use std::collections::{BTreeMap, HashMap};

use parley_core::{AgentCapability, AgentId, Score};
use tracing::debug;

use crate::config::LearningConfig;
use crate::message::RejectionReason;

/// Rejections received, per peer and reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectionLog {
    by_peer: HashMap<AgentId, BTreeMap<RejectionReason, u32>>,
}

impl RejectionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one rejection from `peer`.
    pub fn record(&mut self, peer: &AgentId, reason: RejectionReason) {
        *self
            .by_peer
            .entry(peer.clone())
            .or_default()
            .entry(reason)
            .or_insert(0) += 1;
    }

    /// How many times `peer` rejected us for `reason`.
    #[must_use]
    pub fn count(&self, peer: &AgentId, reason: RejectionReason) -> u32 {
        self.by_peer
            .get(peer)
            .and_then(|reasons| reasons.get(&reason))
            .copied()
            .unwrap_or(0)
    }

    /// Total rejections from `peer`.
    #[must_use]
    pub fn total(&self, peer: &AgentId) -> u32 {
        self.by_peer
            .get(peer)
            .map_or(0, |reasons| reasons.values().sum())
    }
}

/// Applies negotiation outcomes to relationship scores.
#[derive(Debug, Clone, Default)]
pub struct TrustLearner {
    config: LearningConfig,
    rejections: RejectionLog,
}

impl TrustLearner {
    /// Creates a learner with the given rates.
    #[must_use]
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            rejections: RejectionLog::new(),
        }
    }

    /// Learning rates.
    #[must_use]
    pub const fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Rejections received so far.
    #[must_use]
    pub const fn rejections(&self) -> &RejectionLog {
        &self.rejections
    }

    /// Records the outcome of an executed (or failed) agreement with `peer`.
    ///
    /// The collaboration rate moves towards 1.0 or 0.0 by the learning rate;
    /// trust moves by the success or failure delta.
    pub fn record_agreement(&self, capability: &mut AgentCapability, peer: &AgentId, success: bool) {
        let (observation, delta) = if success {
            (1.0, self.config.success_trust_delta)
        } else {
            (0.0, -self.config.failure_trust_delta)
        };

        let history = capability
            .collaboration(peer)
            .blended(observation, self.config.learning_rate);
        let trust = capability.trust(peer).adjusted(delta);
        capability.set_collaboration(peer.clone(), history);
        capability.set_trust(peer.clone(), trust);

        debug!(
            peer = %peer,
            success,
            trust = trust.value(),
            history = history.value(),
            "relationship updated"
        );
    }

    /// Applies partial trust decay after a session with `peer` expired.
    pub fn record_expiry(&self, capability: &mut AgentCapability, peer: &AgentId) -> Score {
        let trust = capability.trust(peer).adjusted(-self.config.trust_decay_rate);
        capability.set_trust(peer.clone(), trust);
        debug!(peer = %peer, trust = trust.value(), "trust decayed after expiry");
        trust
    }

    /// Notes a rejection received from `peer`.
    pub fn record_rejection(&mut self, peer: &AgentId, reason: RejectionReason) {
        self.rejections.record(peer, reason);
    }
}
