//! Negotiation sessions.
//!
//! Each participant holds its own authoritative [`Negotiation`] for a session
//! and drives it through [`NegotiationStatus`] transitions. Sessions only move
//! forward; the single cycle is `CounterOffer <-> OfferMade` while rounds
//! remain.

use std::fmt;

use chrono::{DateTime, Utc};
use parley_core::AgentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::RejectionReason;
use crate::offer::{Agreement, NegotiationId, NegotiationOffer, NegotiationType, RequestDetails};

/// Errors raised by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The requested transition is not allowed from the current status.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: NegotiationStatus,
        /// Requested status.
        to: NegotiationStatus,
    },

    /// The session is terminal and accepts no further rounds.
    #[error("session is closed ({0})")]
    Closed(NegotiationStatus),
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Created locally, request not yet sent.
    Initiated,
    /// Created by the responder on receiving a request.
    InProgress,
    /// A peer offer is on the table.
    OfferMade,
    /// Our counter-offer is on the table.
    CounterOffer,
    /// An offer was accepted; the agreement is being executed.
    Accepted,
    /// Closed without agreement.
    Rejected,
    /// Deadline passed before agreement.
    Expired,
    /// Agreement executed.
    Completed,
}

impl NegotiationStatus {
    /// Checks if a transition to `target` is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use NegotiationStatus::{
            Accepted, Completed, CounterOffer, Expired, InProgress, Initiated, OfferMade, Rejected,
        };

        matches!(
            (self, target),
            (Initiated, InProgress | OfferMade | Rejected | Expired)
                | (InProgress, OfferMade | CounterOffer | Accepted | Rejected | Expired)
                | (OfferMade, CounterOffer | Accepted | Rejected | Expired)
                | (CounterOffer, OfferMade | Accepted | Rejected | Expired)
                | (Accepted, Completed)
        )
    }

    /// Returns true for statuses that accept no further rounds.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Completed | Self::Rejected | Self::Expired
        )
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::InProgress => "in_progress",
            Self::OfferMade => "offer_made",
            Self::CounterOffer => "counter_offer",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the session the local agent is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationRole {
    /// Sent the `negotiation_request`.
    Initiator,
    /// Received the `negotiation_request`.
    Responder,
}

/// Outcome of evaluating one peer offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundDecision {
    /// The offer clears the acceptance threshold.
    Accept,
    /// The round budget is spent; the session is now rejected.
    Reject(RejectionReason),
    /// Send a refined counter-offer.
    Refine,
}

/// One participant's view of a negotiation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Negotiation {
    id: NegotiationId,
    negotiation_type: NegotiationType,
    participants: [AgentId; 2],
    role: NegotiationRole,
    status: NegotiationStatus,
    current_round: u32,
    max_rounds: u32,
    deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    initial_request: RequestDetails,
    history: Vec<NegotiationOffer>,
    our_last_offer: Option<NegotiationOffer>,
    last_score: Option<f64>,
    peer_satisfaction: Option<f64>,
    rejection_reason: Option<RejectionReason>,
    agreement: Option<Agreement>,
}

impl Negotiation {
    /// Opens a session as the initiator, in `Initiated`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn initiate(
        id: NegotiationId,
        negotiation_type: NegotiationType,
        initiator: AgentId,
        responder: AgentId,
        request: RequestDetails,
        max_rounds: u32,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::open(
            id,
            negotiation_type,
            [initiator, responder],
            NegotiationRole::Initiator,
            NegotiationStatus::Initiated,
            request,
            max_rounds,
            deadline,
            now,
        )
    }

    /// Opens a session as the responder, in `InProgress`, with the
    /// initiator's opening offer already in the history.
    #[must_use]
    pub fn respond(
        id: NegotiationId,
        initial_offer: NegotiationOffer,
        request: RequestDetails,
        max_rounds: u32,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let participants = [initial_offer.from_agent().clone(), initial_offer.to_agent().clone()];
        let mut session = Self::open(
            id,
            initial_offer.negotiation_type(),
            participants,
            NegotiationRole::Responder,
            NegotiationStatus::InProgress,
            request,
            max_rounds,
            deadline,
            now,
        );
        session.history.push(initial_offer);
        session
    }

    #[allow(clippy::too_many_arguments)]
    fn open(
        id: NegotiationId,
        negotiation_type: NegotiationType,
        participants: [AgentId; 2],
        role: NegotiationRole,
        status: NegotiationStatus,
        initial_request: RequestDetails,
        max_rounds: u32,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            negotiation_type,
            participants,
            role,
            status,
            current_round: 0,
            max_rounds,
            deadline,
            created_at: now,
            closed_at: None,
            initial_request,
            history: Vec::new(),
            our_last_offer: None,
            last_score: None,
            peer_satisfaction: None,
            rejection_reason: None,
            agreement: None,
        }
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> NegotiationId {
        self.id
    }

    /// Negotiation type.
    #[must_use]
    pub const fn negotiation_type(&self) -> NegotiationType {
        self.negotiation_type
    }

    /// `[initiator, responder]`.
    #[must_use]
    pub const fn participants(&self) -> &[AgentId; 2] {
        &self.participants
    }

    /// The initiator.
    #[must_use]
    pub const fn initiator(&self) -> &AgentId {
        &self.participants[0]
    }

    /// The responder.
    #[must_use]
    pub const fn responder(&self) -> &AgentId {
        &self.participants[1]
    }

    /// The other participant from the local agent's point of view.
    #[must_use]
    pub const fn peer(&self) -> &AgentId {
        match self.role {
            NegotiationRole::Initiator => &self.participants[1],
            NegotiationRole::Responder => &self.participants[0],
        }
    }

    /// Local agent's role.
    #[must_use]
    pub const fn role(&self) -> NegotiationRole {
        self.role
    }

    /// Current status, without applying expiry.
    #[must_use]
    pub const fn status(&self) -> NegotiationStatus {
        self.status
    }

    /// Peer offers evaluated so far.
    #[must_use]
    pub const fn current_round(&self) -> u32 {
        self.current_round
    }

    /// Round budget.
    #[must_use]
    pub const fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Session deadline.
    #[must_use]
    pub const fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// When the session was opened.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the session reached a terminal status.
    #[must_use]
    pub const fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// The request that opened the session.
    #[must_use]
    pub const fn initial_request(&self) -> &RequestDetails {
        &self.initial_request
    }

    /// Every offer sent or received, oldest first.
    #[must_use]
    pub fn history(&self) -> &[NegotiationOffer] {
        &self.history
    }

    /// The most recent offer we sent.
    #[must_use]
    pub const fn our_last_offer(&self) -> Option<&NegotiationOffer> {
        self.our_last_offer.as_ref()
    }

    /// Score of the most recently evaluated peer offer.
    #[must_use]
    pub const fn last_score(&self) -> Option<f64> {
        self.last_score
    }

    /// Satisfaction the peer reported on acceptance.
    #[must_use]
    pub const fn peer_satisfaction(&self) -> Option<f64> {
        self.peer_satisfaction
    }

    /// Why the session was rejected or expired.
    #[must_use]
    pub const fn rejection_reason(&self) -> Option<RejectionReason> {
        self.rejection_reason
    }

    /// The executed agreement, once accepted.
    #[must_use]
    pub const fn agreement(&self) -> Option<&Agreement> {
        self.agreement.as_ref()
    }

    /// Returns true if `agent` takes part in this session.
    #[must_use]
    pub fn involves(&self, agent: &AgentId) -> bool {
        self.participants.contains(agent)
    }

    /// Returns true if `offer_id` appears in the history.
    #[must_use]
    pub fn has_offer(&self, offer_id: crate::offer::OfferId) -> bool {
        self.history.iter().any(|offer| offer.offer_id() == offer_id)
    }

    fn transition_to(&mut self, target: NegotiationStatus, now: DateTime<Utc>) -> Result<(), SessionError> {
        if !self.status.can_transition_to(&target) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        if target.is_terminal() && self.closed_at.is_none() {
            self.closed_at = Some(now);
        }
        Ok(())
    }

    /// Expires the session if `now` is past its deadline.
    ///
    /// Returns true if this call moved the session to `Expired`.
    pub fn check_deadline(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || now <= self.deadline {
            return false;
        }
        self.status = NegotiationStatus::Expired;
        self.rejection_reason = Some(RejectionReason::DeadlineExpired);
        self.closed_at = Some(now);
        true
    }

    /// Applies expiry, then fails if the session is terminal.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` for terminal sessions.
    pub fn ensure_open(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.check_deadline(now);
        if self.status.is_terminal() {
            return Err(SessionError::Closed(self.status));
        }
        Ok(())
    }

    /// Records that our opening request went out.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Initiated`.
    pub fn mark_request_sent(&mut self, offer: NegotiationOffer, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition_to(NegotiationStatus::OfferMade, now)?;
        self.history.push(offer.clone());
        self.our_last_offer = Some(offer);
        Ok(())
    }

    /// Consumes one round for `offer` and decides what to do with it.
    ///
    /// The round counter is incremented first. An offer scoring strictly
    /// above `threshold` is accepted. Otherwise, once the counter reaches the
    /// round budget the session is rejected with `max_rounds_exceeded`;
    /// before that the caller should refine.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or expired.
    pub fn decide(
        &mut self,
        offer: NegotiationOffer,
        score: f64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Result<RoundDecision, SessionError> {
        self.ensure_open(now)?;
        if self.status != NegotiationStatus::OfferMade {
            self.transition_to(NegotiationStatus::OfferMade, now)?;
        }

        self.current_round += 1;
        self.history.push(offer);
        self.last_score = Some(score);

        if score > threshold {
            return Ok(RoundDecision::Accept);
        }
        if self.current_round >= self.max_rounds {
            self.reject(RejectionReason::MaxRoundsExceeded, now)?;
            return Ok(RoundDecision::Reject(RejectionReason::MaxRoundsExceeded));
        }
        Ok(RoundDecision::Refine)
    }

    /// Records a counter-offer we sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot move to `CounterOffer`.
    pub fn record_counter_offer(&mut self, offer: NegotiationOffer, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition_to(NegotiationStatus::CounterOffer, now)?;
        self.history.push(offer.clone());
        self.our_last_offer = Some(offer);
        Ok(())
    }

    /// Marks the session accepted under `agreement`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not open.
    pub fn accept(&mut self, agreement: Agreement, peer_satisfaction: Option<f64>, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition_to(NegotiationStatus::Accepted, now)?;
        self.agreement = Some(agreement);
        self.peer_satisfaction = peer_satisfaction;
        Ok(())
    }

    /// Marks the accepted agreement executed.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Accepted`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition_to(NegotiationStatus::Completed, now)
    }

    /// Closes the session without agreement.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is already terminal.
    pub fn reject(&mut self, reason: RejectionReason, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition_to(NegotiationStatus::Rejected, now)?;
        self.rejection_reason = Some(reason);
        Ok(())
    }

    /// Expires the session regardless of its deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is already terminal.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.transition_to(NegotiationStatus::Expired, now)?;
        self.rejection_reason = Some(RejectionReason::DeadlineExpired);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn agent(name: &str) -> AgentId {
        AgentId::new(name).unwrap()
    }

    fn peer_offer(now: DateTime<Utc>) -> NegotiationOffer {
        NegotiationOffer::builder(agent("policy_agent"), agent("fraud_agent"), NegotiationType::TaskAssignment)
            .build(now)
    }

    fn session(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Negotiation {
        let mut session = Negotiation::initiate(
            Uuid::new_v4(),
            NegotiationType::TaskAssignment,
            agent("fraud_agent"),
            agent("policy_agent"),
            RequestDetails::new("verify_policy"),
            10,
            deadline,
            now,
        );
        let opening = NegotiationOffer::builder(agent("fraud_agent"), agent("policy_agent"), NegotiationType::TaskAssignment)
            .build(now);
        session.mark_request_sent(opening, now).unwrap();
        session
    }

    // ==================== Transitions ====================

    #[test]
    fn transition_table() {
        use NegotiationStatus::*;

        assert!(Initiated.can_transition_to(&OfferMade));
        assert!(InProgress.can_transition_to(&CounterOffer));
        assert!(CounterOffer.can_transition_to(&OfferMade));
        assert!(OfferMade.can_transition_to(&CounterOffer));
        assert!(Accepted.can_transition_to(&Completed));

        assert!(!Initiated.can_transition_to(&Accepted));
        assert!(!Accepted.can_transition_to(&Rejected));
        assert!(!Completed.can_transition_to(&InProgress));
        assert!(!Rejected.can_transition_to(&OfferMade));
        assert!(!Expired.can_transition_to(&Completed));
    }

    #[test]
    fn terminal_statuses() {
        use NegotiationStatus::*;

        for status in [Accepted, Completed, Rejected, Expired] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        for status in [Initiated, InProgress, OfferMade, CounterOffer] {
            assert!(!status.is_terminal(), "{status} should be open");
        }
    }

    #[test]
    fn invalid_transition_is_an_error() {
        let now = Utc::now();
        let mut session = session(now + Duration::seconds(30), now);
        let err = session.complete(now).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: NegotiationStatus::OfferMade,
                to: NegotiationStatus::Completed,
            }
        );
    }

    // ==================== Rounds ====================

    #[test]
    fn high_score_accepts_in_first_round() {
        let now = Utc::now();
        let mut session = session(now + Duration::seconds(30), now);

        let decision = session.decide(peer_offer(now), 0.93, 0.8, now).unwrap();
        assert_eq!(decision, RoundDecision::Accept);
        assert_eq!(session.current_round(), 1);
    }

    #[test]
    fn score_equal_to_threshold_is_not_accepted() {
        let now = Utc::now();
        let mut session = session(now + Duration::seconds(30), now);

        let decision = session.decide(peer_offer(now), 0.8, 0.8, now).unwrap();
        assert_eq!(decision, RoundDecision::Refine);
    }

    #[test]
    fn ten_mediocre_rounds_reject_at_round_ten() {
        let now = Utc::now();
        let mut session = session(now + Duration::seconds(30), now);

        for round in 1..10 {
            let decision = session.decide(peer_offer(now), 0.5, 0.8, now).unwrap();
            assert_eq!(decision, RoundDecision::Refine, "round {round}");
            session.record_counter_offer(peer_offer(now), now).unwrap();
        }

        let decision = session.decide(peer_offer(now), 0.5, 0.8, now).unwrap();
        assert_eq!(decision, RoundDecision::Reject(RejectionReason::MaxRoundsExceeded));
        assert_eq!(session.status(), NegotiationStatus::Rejected);
        assert_eq!(session.current_round(), 10);
        assert_eq!(session.rejection_reason(), Some(RejectionReason::MaxRoundsExceeded));

        let err = session.decide(peer_offer(now), 0.5, 0.8, now).unwrap_err();
        assert_eq!(err, SessionError::Closed(NegotiationStatus::Rejected));
        assert_eq!(session.current_round(), 10);
    }

    // ==================== Deadlines ====================

    #[test]
    fn past_deadline_expires_on_first_access() {
        let now = Utc::now();
        let mut session = session(now - Duration::milliseconds(1), now - Duration::seconds(1));

        assert!(session.check_deadline(now));
        assert_eq!(session.status(), NegotiationStatus::Expired);
        assert_eq!(session.rejection_reason(), Some(RejectionReason::DeadlineExpired));
        assert!(!session.check_deadline(now));
    }

    #[test]
    fn expired_session_refuses_offers_without_consuming_rounds() {
        let now = Utc::now();
        let mut session = session(now - Duration::milliseconds(1), now);

        let err = session.decide(peer_offer(now), 0.99, 0.8, now).unwrap_err();
        assert_eq!(err, SessionError::Closed(NegotiationStatus::Expired));
        assert_eq!(session.current_round(), 0);
    }

    #[test]
    fn responder_session_starts_in_progress_with_opening_offer() {
        let now = Utc::now();
        let opening = NegotiationOffer::builder(agent("fraud_agent"), agent("policy_agent"), NegotiationType::TaskAssignment)
            .build(now);
        let session = Negotiation::respond(
            Uuid::new_v4(),
            opening,
            RequestDetails::default(),
            10,
            now + Duration::seconds(30),
            now,
        );

        assert_eq!(session.status(), NegotiationStatus::InProgress);
        assert_eq!(session.role(), NegotiationRole::Responder);
        assert_eq!(session.peer(), &agent("fraud_agent"));
        assert_eq!(session.history().len(), 1);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn round_counter_never_exceeds_budget(
                max_rounds in 1u32..15,
                scores in proptest::collection::vec(0.0f64..0.8, 1..40),
            ) {
                let now = Utc::now();
                let mut session = Negotiation::initiate(
                    Uuid::new_v4(),
                    NegotiationType::ResourceAllocation,
                    agent("a"),
                    agent("b"),
                    RequestDetails::default(),
                    max_rounds,
                    now + Duration::seconds(30),
                    now,
                );
                session.mark_request_sent(peer_offer(now), now).unwrap();

                for score in scores {
                    match session.decide(peer_offer(now), score, 0.8, now) {
                        Ok(RoundDecision::Refine) => session.record_counter_offer(peer_offer(now), now).unwrap(),
                        Ok(_) | Err(_) => {}
                    }
                    prop_assert!(session.current_round() <= max_rounds);
                }
            }
        }
    }
}
