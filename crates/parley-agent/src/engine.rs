//! The per-agent negotiation engine.
//!
//! A [`NegotiationEngine`] owns one agent's capability, its open sessions and
//! its archive. It is synchronous and time-injected: every operation takes
//! `now`, and every message it wants sent comes back as an outbound
//! [`Envelope`] for the caller to deliver.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parley_core::{AgentCapability, AgentId, ResourceMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatch::{self, Handled};
use crate::error::{ProtocolError, ProtocolResult};
use crate::evaluation::{self, OfferScore, Terms};
use crate::history::NegotiationRecord;
use crate::learner::TrustLearner;
use crate::message::{
    Alternative, DeclineReason, Envelope, InviteResponse, ProtocolMessage, RejectionReason, Reply,
    ResourceReport,
};
use crate::offer::{
    Agreement, NegotiationId, NegotiationOffer, NegotiationType, Proposal, RequestDetails,
};
use crate::session::{Negotiation, NegotiationRole, NegotiationStatus, RoundDecision};
use crate::strategy::{DefaultHooks, NegotiationHooks, StrategyFactors};

/// Conditions attached to every counter-offer.
pub const ACCEPTANCE_CONDITIONS: [&str; 2] = ["resource_availability_maintained", "workload_manageable"];

/// Outcome of the participation gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ParticipationDecision {
    /// Go ahead and negotiate.
    Participate,
    /// Decline before any round is played.
    Decline {
        /// The failed check.
        reason: DeclineReason,
        /// Alternatives to offer the sender.
        alternatives: Vec<Alternative>,
    },
}

impl ParticipationDecision {
    fn decline(reason: DeclineReason) -> Self {
        Self::Decline {
            reason,
            alternatives: Alternative::ALL.to_vec(),
        }
    }

    /// Returns true if the gate passed.
    #[must_use]
    pub const fn is_participate(&self) -> bool {
        matches!(self, Self::Participate)
    }
}

/// One agent's negotiation engine.
#[derive(Debug)]
pub struct NegotiationEngine<H: NegotiationHooks = DefaultHooks> {
    capability: AgentCapability,
    config: EngineConfig,
    hooks: H,
    learner: TrustLearner,
    sessions: HashMap<NegotiationId, Negotiation>,
    records: Vec<NegotiationRecord>,
    archived: HashMap<NegotiationId, usize>,
}

impl NegotiationEngine<DefaultHooks> {
    /// Creates an engine with the default hooks.
    #[must_use]
    pub fn new(capability: AgentCapability, config: EngineConfig) -> Self {
        let hooks = DefaultHooks::new(config.learning.stalemate_limit);
        Self::with_hooks(capability, config, hooks)
    }
}

impl<H: NegotiationHooks> NegotiationEngine<H> {
    /// Creates an engine with custom hooks.
    #[must_use]
    pub fn with_hooks(capability: AgentCapability, config: EngineConfig, hooks: H) -> Self {
        let learner = TrustLearner::new(config.learning);
        Self {
            capability,
            config,
            hooks,
            learner,
            sessions: HashMap::new(),
            records: Vec::new(),
            archived: HashMap::new(),
        }
    }

    /// The local agent.
    #[must_use]
    pub const fn agent_id(&self) -> &AgentId {
        self.capability.agent_id()
    }

    /// Current capability snapshot.
    #[must_use]
    pub const fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Domain hooks.
    #[must_use]
    pub const fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Trust learner state.
    #[must_use]
    pub const fn learner(&self) -> &TrustLearner {
        &self.learner
    }

    /// Number of open sessions.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// An open session, without applying expiry.
    #[must_use]
    pub fn session(&self, negotiation_id: NegotiationId) -> Option<&Negotiation> {
        self.sessions.get(&negotiation_id)
    }

    /// Every archived session, oldest first.
    #[must_use]
    pub fn history(&self) -> &[NegotiationRecord] {
        &self.records
    }

    /// The archived record of a session.
    #[must_use]
    pub fn record(&self, negotiation_id: NegotiationId) -> Option<&NegotiationRecord> {
        self.archived
            .get(&negotiation_id)
            .and_then(|index| self.records.get(*index))
    }

    /// Status of a session, expiring it first if its deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::UnknownNegotiation` if the id was never seen.
    pub fn status(&mut self, negotiation_id: NegotiationId, now: DateTime<Utc>) -> ProtocolResult<NegotiationStatus> {
        if let Some(session) = self.sessions.get(&negotiation_id) {
            if now <= session.deadline() {
                return Ok(session.status());
            }
        }
        if let Some(mut session) = self.sessions.remove(&negotiation_id) {
            session.check_deadline(now);
            let status = session.status();
            self.close_expired(session);
            return Ok(status);
        }
        self.record(negotiation_id)
            .map(|record| record.final_status)
            .ok_or(ProtocolError::UnknownNegotiation(negotiation_id))
    }

    /// Workload-discounted availability report.
    #[must_use]
    pub fn resource_report(&self) -> ResourceReport {
        ResourceReport {
            agent_id: self.agent_id().clone(),
            available_resources: self.capability.available_now(),
            current_workload: self.capability.current_workload(),
            expertise_areas: self.capability.expertise_areas().clone(),
        }
    }

    /// Handles one inbound envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is refused; engine state is unchanged
    /// except for sessions found expired along the way.
    pub fn handle(&mut self, envelope: Envelope, now: DateTime<Utc>) -> ProtocolResult<Handled> {
        dispatch::dispatch(self, envelope, now)
    }

    // ==================== Initiating ====================

    /// Opens a negotiation with `peer` using the configured session timeout.
    ///
    /// Returns the new session id and the `negotiation_request` to send.
    ///
    /// # Errors
    ///
    /// Returns an error if `peer` is the local agent.
    pub fn initiate(
        &mut self,
        peer: &AgentId,
        negotiation_type: NegotiationType,
        request: RequestDetails,
        now: DateTime<Utc>,
    ) -> ProtocolResult<(NegotiationId, Envelope)> {
        let deadline = now + self.config.session_timeout();
        self.initiate_until(peer, negotiation_type, request, deadline, now)
    }

    /// Opens a negotiation with `peer` that expires at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns an error if `peer` is the local agent.
    pub fn initiate_until(
        &mut self,
        peer: &AgentId,
        negotiation_type: NegotiationType,
        request: RequestDetails,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ProtocolResult<(NegotiationId, Envelope)> {
        if peer == self.agent_id() {
            return Err(ProtocolError::SelfNegotiation(peer.clone()));
        }

        let negotiation_id = Uuid::new_v4();
        let needs = self
            .hooks
            .assess_needs(NegotiationRole::Initiator, &request, &self.capability);
        let terms = evaluation::initial_terms(&self.capability, peer, &request.resources_in_return, &needs);
        let offer = self.build_offer(
            peer,
            negotiation_type,
            &request,
            terms,
            self.config.offer_lifetimes.initial_ms,
            now,
        );

        let mut session = Negotiation::initiate(
            negotiation_id,
            negotiation_type,
            self.agent_id().clone(),
            peer.clone(),
            request.clone(),
            self.config.max_rounds,
            deadline,
            now,
        );
        session.mark_request_sent(offer.clone(), now)?;
        self.sessions.insert(negotiation_id, session);

        info!(
            negotiation_id = %negotiation_id,
            peer = %peer,
            negotiation_type = %negotiation_type,
            "negotiation initiated"
        );

        let message = ProtocolMessage::NegotiationRequest {
            negotiation_id,
            from_agent: self.agent_id().clone(),
            negotiation_type,
            initial_offer: offer,
            deadline,
            request_details: request,
        };
        Ok((negotiation_id, self.envelope(peer, message)))
    }

    // ==================== Participation ====================

    /// Decides whether to negotiate with `from` over `request`.
    ///
    /// Checks, in order: trust in the sender, coverage of each requested
    /// resource, workload, expertise overlap and estimated benefit.
    #[must_use]
    pub fn evaluate_participation(
        &self,
        from: &AgentId,
        request: &RequestDetails,
        offer: Option<&NegotiationOffer>,
    ) -> ParticipationDecision {
        let gate = &self.config.participation;

        let trust = self.capability.trust(from).value();
        if trust < gate.min_trust {
            return ParticipationDecision::decline(DeclineReason::LowTrust { trust });
        }

        let requested = offer.map_or(&request.resources_needed, NegotiationOffer::resources_requested);
        for (kind, amount) in requested.iter() {
            let available = self.capability.available_now_of(kind);
            if available < amount * gate.min_resource_coverage {
                return ParticipationDecision::decline(DeclineReason::InsufficientResources {
                    kind: kind.clone(),
                    available,
                    requested: amount,
                });
            }
        }

        let workload = self.capability.current_workload();
        if workload > gate.max_workload {
            return ParticipationDecision::decline(DeclineReason::ExcessiveWorkload { workload });
        }

        if !request.required_expertise.is_empty()
            && self.capability.expertise_overlap(&request.required_expertise) == 0
        {
            return ParticipationDecision::decline(DeclineReason::NoExpertiseOverlap {
                required: request.required_expertise.clone(),
            });
        }

        let benefit = self.hooks.potential_benefit(request, offer, &self.capability);
        if benefit < gate.min_benefit {
            return ParticipationDecision::decline(DeclineReason::InsufficientBenefit { benefit });
        }

        ParticipationDecision::Participate
    }

    // ==================== Inbound handlers ====================

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_negotiation_request(
        &mut self,
        from: &AgentId,
        negotiation_id: NegotiationId,
        negotiation_type: NegotiationType,
        initial_offer: NegotiationOffer,
        deadline: DateTime<Utc>,
        request: RequestDetails,
        now: DateTime<Utc>,
    ) -> ProtocolResult<Handled> {
        if initial_offer.from_agent() != from || initial_offer.to_agent() != self.agent_id() {
            return Err(ProtocolError::Malformed(format!(
                "initial offer runs {} -> {}, envelope runs {from} -> {}",
                initial_offer.from_agent(),
                initial_offer.to_agent(),
                self.agent_id()
            )));
        }
        if self.sessions.contains_key(&negotiation_id) || self.archived.contains_key(&negotiation_id) {
            return Err(ProtocolError::DuplicateNegotiation(negotiation_id));
        }

        if now > deadline {
            debug!(negotiation_id = %negotiation_id, peer = %from, "request arrived after its deadline");
            let reason = RejectionReason::DeadlineExpired;
            return Ok(Handled::new(Reply::Rejected { negotiation_id, reason })
                .send(self.envelope(from, ProtocolMessage::rejection(negotiation_id, reason, None))));
        }

        if let ParticipationDecision::Decline { reason, alternatives } =
            self.evaluate_participation(from, &request, Some(&initial_offer))
        {
            info!(negotiation_id = %negotiation_id, peer = %from, reason = ?reason, "declined to negotiate");
            let message = ProtocolMessage::Rejection {
                negotiation_id,
                reason: RejectionReason::InsufficientResourcesOrInterest,
                detail: Some(reason.clone()),
                alternative_suggestions: alternatives,
                best_offer_score: None,
            };
            return Ok(Handled::new(Reply::Declined { reason }).send(self.envelope(from, message)));
        }

        let peer_requested = initial_offer.resources_requested().clone();
        let mut session = Negotiation::respond(
            negotiation_id,
            initial_offer,
            request.clone(),
            self.config.max_rounds,
            deadline,
            now,
        );

        let needs = self
            .hooks
            .assess_needs(NegotiationRole::Responder, &request, &self.capability);
        let style = self
            .hooks
            .select_strategy(from, &self.capability, self.learner.rejections());
        let factors = StrategyFactors::for_style(style, self.capability.trust(from).value());
        let terms = evaluation::counter_terms(&self.capability, factors, &peer_requested, &needs);
        let counter = self.build_offer(
            from,
            negotiation_type,
            &request,
            terms,
            self.config.offer_lifetimes.counter_ms,
            now,
        );
        session.record_counter_offer(counter.clone(), now)?;
        self.sessions.insert(negotiation_id, session);

        info!(
            negotiation_id = %negotiation_id,
            peer = %from,
            strategy = %style,
            "counter-offer sent"
        );

        let offer_id = counter.offer_id();
        let message = ProtocolMessage::CounterOffer {
            negotiation_id,
            offer: counter,
            reasoning: format!(
                "{style} strategy: offering {:.0}% of availability and asking {:.0}% of need",
                factors.offer * 100.0,
                factors.request * 100.0
            ),
            conditions: conditions(),
            round: 0,
        };
        Ok(Handled::new(Reply::CounterOffered {
            negotiation_id,
            offer_id,
            round: 0,
        })
        .send(self.envelope(from, message)))
    }

    pub(crate) fn on_offer(
        &mut self,
        from: &AgentId,
        negotiation_id: NegotiationId,
        offer: NegotiationOffer,
        now: DateTime<Utc>,
    ) -> ProtocolResult<Handled> {
        let mut session = self.checkout(negotiation_id, from, now)?;

        if offer.from_agent() != from || offer.to_agent() != self.agent_id() {
            self.checkin(session);
            return Err(ProtocolError::Malformed(format!(
                "offer {} runs {} -> {}",
                offer.offer_id(),
                offer.from_agent(),
                offer.to_agent()
            )));
        }
        if offer.is_expired(now) {
            self.checkin(session);
            return Err(ProtocolError::OfferExpired {
                offer_id: offer.offer_id(),
            });
        }

        let needs = self
            .hooks
            .assess_needs(session.role(), session.initial_request(), &self.capability);
        let score = evaluation::score_offer(&self.capability, &offer, &needs);
        let decision = session.decide(offer.clone(), score.value, self.config.acceptance_threshold, now);

        debug!(
            negotiation_id = %negotiation_id,
            peer = %from,
            round = session.current_round(),
            score = score.value,
            needs = score.needs_satisfaction,
            reasonableness = score.reasonableness,
            "offer evaluated"
        );

        match decision {
            Ok(RoundDecision::Accept) => self.execute_agreement(session, offer, score, now),
            Ok(RoundDecision::Reject(reason)) => {
                info!(negotiation_id = %negotiation_id, peer = %from, reason = %reason, "negotiation rejected");
                self.checkin(session);
                Ok(Handled::new(Reply::Rejected { negotiation_id, reason })
                    .send(self.envelope(from, ProtocolMessage::rejection(negotiation_id, reason, Some(score.value)))))
            }
            Ok(RoundDecision::Refine) => self.send_refinement(session, score, now),
            Err(err) => {
                self.checkin(session);
                Err(err.into())
            }
        }
    }

    pub(crate) fn on_acceptance(
        &mut self,
        from: &AgentId,
        negotiation_id: NegotiationId,
        agreement: Agreement,
        satisfaction_score: f64,
        now: DateTime<Utc>,
    ) -> ProtocolResult<Handled> {
        let mut session = match self.checkout(negotiation_id, from, now) {
            Ok(session) => session,
            Err(err @ ProtocolError::SessionClosed { .. }) => {
                return self.refuse_late_acceptance(from, negotiation_id, err);
            }
            Err(err) => return Err(err),
        };

        let terms = &agreement.terms;
        if agreement.negotiation_id != negotiation_id
            || terms.from_agent() != self.agent_id()
            || terms.to_agent() != from
        {
            self.checkin(session);
            return Err(ProtocolError::Malformed(format!(
                "agreement {} does not accept one of our offers",
                agreement.agreement_id
            )));
        }
        if !session.has_offer(terms.offer_id()) {
            self.checkin(session);
            return Err(ProtocolError::UnknownOffer {
                negotiation_id,
                offer_id: terms.offer_id(),
            });
        }

        let commitment = agreement.commitment_for(self.agent_id());
        if let Err(err) = self.capability.try_commit(&commitment) {
            warn!(negotiation_id = %negotiation_id, peer = %from, error = %err, "reservation failed after peer accepted");
            let reason = RejectionReason::ResourcesUnavailable;
            let rejected = session.reject(reason, now);
            self.checkin(session);
            rejected?;
            return Ok(Handled::new(Reply::Rejected { negotiation_id, reason })
                .send(self.envelope(from, ProtocolMessage::rejection(negotiation_id, reason, None))));
        }

        let satisfaction = satisfaction_score.clamp(0.0, 1.0);
        let transition = session
            .accept(agreement.clone(), Some(satisfaction), now)
            .and_then(|()| session.complete(now));
        if let Err(err) = transition {
            self.capability.release(&commitment);
            self.checkin(session);
            return Err(err.into());
        }
        self.apply_agreement(&agreement, from);
        self.checkin(session);

        info!(negotiation_id = %negotiation_id, peer = %from, satisfaction, "agreement executed");
        Ok(Handled::new(Reply::Accepted {
            negotiation_id,
            agreement,
            score: satisfaction,
        }))
    }

    pub(crate) fn on_rejection(
        &mut self,
        from: &AgentId,
        negotiation_id: NegotiationId,
        reason: RejectionReason,
        now: DateTime<Utc>,
    ) -> ProtocolResult<Handled> {
        if self.sessions.contains_key(&negotiation_id) {
            let mut session = self.checkout(negotiation_id, from, now)?;
            let rejected = session.reject(reason, now);
            self.learner.record_rejection(from, reason);
            self.checkin(session);
            rejected?;
            info!(negotiation_id = %negotiation_id, peer = %from, reason = %reason, "peer rejected negotiation");
            return Ok(Handled::new(Reply::Rejected { negotiation_id, reason }));
        }

        let Some(index) = self.archived.get(&negotiation_id).copied() else {
            return Err(ProtocolError::UnknownNegotiation(negotiation_id));
        };
        let record = &self.records[index];
        if record.counterparty_of(self.agent_id()) != from {
            return Err(ProtocolError::NotParticipant {
                negotiation_id,
                agent: from.clone(),
            });
        }

        let Some(agreement) = record.final_agreement.clone().filter(|_| record.success) else {
            debug!(negotiation_id = %negotiation_id, peer = %from, reason = %reason, "rejection for closed session ignored");
            return Ok(Handled::new(Reply::Acknowledged));
        };

        let updated = record.compensated(reason);
        self.records[index] = updated;
        self.compensate(&agreement, from);
        self.learner.record_rejection(from, reason);
        warn!(
            negotiation_id = %negotiation_id,
            peer = %from,
            "peer could not honor executed agreement, commitment released"
        );
        Ok(Handled::new(Reply::Rejected { negotiation_id, reason }))
    }

    /// Answers an acceptance for a session we already closed without
    /// agreement, so the peer releases what it committed.
    fn refuse_late_acceptance(
        &self,
        from: &AgentId,
        negotiation_id: NegotiationId,
        closed: ProtocolError,
    ) -> ProtocolResult<Handled> {
        let Some(record) = self.record(negotiation_id) else {
            return Err(closed);
        };
        if record.success || record.counterparty_of(self.agent_id()) != from {
            return Err(closed);
        }

        let reason = record.reason.unwrap_or(RejectionReason::DeadlineExpired);
        warn!(
            negotiation_id = %negotiation_id,
            peer = %from,
            status = %record.final_status,
            reason = %reason,
            "acceptance arrived after session closed"
        );
        Ok(Handled::new(Reply::Rejected { negotiation_id, reason })
            .send(self.envelope(from, ProtocolMessage::rejection(negotiation_id, reason, None))))
    }

    pub(crate) fn on_resource_query(&self, from: &AgentId) -> Handled {
        debug!(peer = %from, "resource query");
        Handled::new(Reply::Resources(self.resource_report()))
    }

    pub(crate) fn on_collaboration_invite(&self, from: &AgentId, details: &RequestDetails) -> Handled {
        let benefit = self.hooks.potential_benefit(details, None, &self.capability);
        let response = if benefit > self.config.cooperation_threshold {
            InviteResponse::Accept {
                conditions: conditions(),
            }
        } else {
            InviteResponse::Decline {
                reason: "insufficient_benefit".to_string(),
                benefit,
            }
        };
        info!(peer = %from, benefit, accepted = response.is_accept(), "collaboration invite evaluated");
        Handled::new(Reply::Invitation(response))
    }

    // ==================== Maintenance ====================

    /// Expires every session whose deadline has passed.
    ///
    /// Returns a `deadline_expired` rejection for each affected peer.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> Vec<Envelope> {
        let stale: Vec<NegotiationId> = self
            .sessions
            .values()
            .filter(|session| now > session.deadline())
            .map(Negotiation::id)
            .collect();

        let mut outbound = Vec::with_capacity(stale.len());
        for negotiation_id in stale {
            if let Some(mut session) = self.sessions.remove(&negotiation_id) {
                session.check_deadline(now);
                let peer = session.peer().clone();
                self.close_expired(session);
                outbound.push(self.envelope(
                    &peer,
                    ProtocolMessage::rejection(negotiation_id, RejectionReason::DeadlineExpired, None),
                ));
            }
        }
        outbound
    }

    /// Closes an open session as rejected for a local reason, such as an
    /// unreachable peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or already closed.
    pub fn abort(&mut self, negotiation_id: NegotiationId, reason: RejectionReason, now: DateTime<Utc>) -> ProtocolResult<()> {
        let Some(mut session) = self.sessions.remove(&negotiation_id) else {
            return Err(self.missing(negotiation_id));
        };
        let rejected = session.reject(reason, now);
        warn!(negotiation_id = %negotiation_id, peer = %session.peer(), reason = %reason, "negotiation aborted");
        self.checkin(session);
        rejected.map_err(Into::into)
    }

    // ==================== Internals ====================

    fn envelope(&self, to: &AgentId, message: ProtocolMessage) -> Envelope {
        Envelope::new(self.agent_id().clone(), to.clone(), message)
    }

    fn build_offer(
        &self,
        to: &AgentId,
        negotiation_type: NegotiationType,
        request: &RequestDetails,
        terms: Terms,
        lifetime_ms: u64,
        now: DateTime<Utc>,
    ) -> NegotiationOffer {
        let constraints = self
            .capability
            .generate_constraints(self.sessions.len(), &self.config.constraints);
        NegotiationOffer::builder(self.agent_id().clone(), to.clone(), negotiation_type)
            .proposal(Proposal::for_exchange(request, &terms.offered, &terms.requested))
            .offered(terms.offered)
            .requested(terms.requested)
            .constraints(constraints)
            .priority(request.priority)
            .confidence(terms.confidence)
            .lifetime(Duration::milliseconds(lifetime_ms as i64))
            .build(now)
    }

    fn send_refinement(&mut self, mut session: Negotiation, score: OfferScore, now: DateTime<Utc>) -> ProtocolResult<Handled> {
        let peer = session.peer().clone();
        let negotiation_id = session.id();
        let available = self.capability.available_now();
        let terms = match session.our_last_offer() {
            Some(last) => evaluation::refine_terms(last, score.value, self.config.concession_rate, &available),
            None => Terms {
                offered: ResourceMap::new(),
                requested: ResourceMap::new(),
                confidence: score.value,
            },
        };
        let improvement = (terms.confidence - score.value).max(0.0);
        let refined = self.build_offer(
            &peer,
            session.negotiation_type(),
            session.initial_request(),
            terms,
            self.config.offer_lifetimes.refined_ms,
            now,
        );

        let recorded = session.record_counter_offer(refined.clone(), now);
        let round = session.current_round();
        self.checkin(session);
        recorded?;

        debug!(negotiation_id = %negotiation_id, peer = %peer, round, improvement, "refined offer sent");

        let offer_id = refined.offer_id();
        let message = ProtocolMessage::CounterOffer {
            negotiation_id,
            offer: refined,
            reasoning: format!(
                "conceding {:.1}% after round {round} scored {:.3}",
                improvement * 100.0,
                score.value
            ),
            conditions: conditions(),
            round,
        };
        Ok(Handled::new(Reply::CounterOffered {
            negotiation_id,
            offer_id,
            round,
        })
        .send(self.envelope(&peer, message)))
    }

    /// Accepts `offer` on our side: reserve, then commit, then notify.
    fn execute_agreement(
        &mut self,
        mut session: Negotiation,
        offer: NegotiationOffer,
        score: OfferScore,
        now: DateTime<Utc>,
    ) -> ProtocolResult<Handled> {
        let negotiation_id = session.id();
        let peer = session.peer().clone();
        let agreement = Agreement::new(
            negotiation_id,
            offer,
            session.responder().clone(),
            session.initial_request().workload_increase,
            now,
        );

        let commitment = agreement.commitment_for(self.agent_id());
        if let Err(err) = self.capability.try_commit(&commitment) {
            warn!(negotiation_id = %negotiation_id, peer = %peer, error = %err, "reservation failed, rejecting acceptable offer");
            let reason = RejectionReason::ResourcesUnavailable;
            let rejected = session.reject(reason, now);
            self.checkin(session);
            rejected?;
            return Ok(Handled::new(Reply::Rejected { negotiation_id, reason })
                .send(self.envelope(&peer, ProtocolMessage::rejection(negotiation_id, reason, Some(score.value)))));
        }

        let transition = session
            .accept(agreement.clone(), None, now)
            .and_then(|()| session.complete(now));
        if let Err(err) = transition {
            self.capability.release(&commitment);
            self.checkin(session);
            return Err(err.into());
        }
        self.apply_agreement(&agreement, &peer);
        let round = session.current_round();
        self.checkin(session);

        info!(negotiation_id = %negotiation_id, peer = %peer, round, score = score.value, "offer accepted");

        let message = ProtocolMessage::Acceptance {
            negotiation_id,
            agreement: agreement.clone(),
            satisfaction_score: score.value,
        };
        Ok(Handled::new(Reply::Accepted {
            negotiation_id,
            agreement,
            score: score.value,
        })
        .send(self.envelope(&peer, message)))
    }

    fn apply_agreement(&mut self, agreement: &Agreement, peer: &AgentId) {
        if &agreement.task_owner == self.agent_id() {
            self.capability.add_workload(agreement.workload_increase);
        }
        self.learner.record_agreement(&mut self.capability, peer, true);
    }

    fn compensate(&mut self, agreement: &Agreement, peer: &AgentId) {
        let commitment = agreement.commitment_for(self.agent_id());
        self.capability.release(&commitment);
        if &agreement.task_owner == self.agent_id() {
            self.capability.add_workload(-agreement.workload_increase);
        }
        self.learner.record_agreement(&mut self.capability, peer, false);
    }

    /// Takes an open session out for mutation, applying expiry first.
    fn checkout(&mut self, negotiation_id: NegotiationId, from: &AgentId, now: DateTime<Utc>) -> ProtocolResult<Negotiation> {
        let Some(mut session) = self.sessions.remove(&negotiation_id) else {
            return Err(self.missing(negotiation_id));
        };
        if session.peer() != from {
            self.sessions.insert(negotiation_id, session);
            return Err(ProtocolError::NotParticipant {
                negotiation_id,
                agent: from.clone(),
            });
        }
        if session.check_deadline(now) {
            self.close_expired(session);
            return Err(ProtocolError::SessionClosed {
                negotiation_id,
                status: NegotiationStatus::Expired,
            });
        }
        Ok(session)
    }

    /// Puts a session back, archiving it if it has become terminal.
    fn checkin(&mut self, session: Negotiation) {
        if session.status().is_terminal() {
            self.archive(session);
        } else {
            self.sessions.insert(session.id(), session);
        }
    }

    fn close_expired(&mut self, session: Negotiation) {
        let trust = self.learner.record_expiry(&mut self.capability, session.peer());
        info!(
            negotiation_id = %session.id(),
            peer = %session.peer(),
            round = session.current_round(),
            trust = trust.value(),
            "negotiation expired"
        );
        self.archive(session);
    }

    fn archive(&mut self, session: Negotiation) {
        let record = NegotiationRecord::from_session(&session, self.agent_id());
        debug!(
            negotiation_id = %record.negotiation_id,
            status = %record.final_status,
            rounds = record.rounds,
            "session archived"
        );
        self.archived.insert(record.negotiation_id, self.records.len());
        self.records.push(record);
    }

    fn missing(&self, negotiation_id: NegotiationId) -> ProtocolError {
        match self.record(negotiation_id) {
            Some(record) => ProtocolError::SessionClosed {
                negotiation_id,
                status: record.final_status,
            },
            None => ProtocolError::UnknownNegotiation(negotiation_id),
        }
    }
}

fn conditions() -> Vec<String> {
    ACCEPTANCE_CONDITIONS.iter().map(ToString::to_string).collect()
}
