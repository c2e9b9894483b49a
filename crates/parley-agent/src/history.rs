//! Archived negotiation records.

use std::collections::BTreeMap;

use parley_core::{AgentId, ResourceMap};
use serde::{Deserialize, Serialize};

use crate::message::RejectionReason;
use crate::offer::{Agreement, NegotiationId, NegotiationType};
use crate::session::{Negotiation, NegotiationStatus};

/// A participant's opening position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// What the participant first offered.
    pub offered: ResourceMap,
    /// What the participant first asked for.
    pub requested: ResourceMap,
}

/// Immutable learning record of a terminal session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    /// Session id.
    pub negotiation_id: NegotiationId,
    /// `[initiator, responder]`.
    pub participants: [AgentId; 2],
    /// Negotiation type.
    pub negotiation_type: NegotiationType,
    /// First offer made by each participant that made one.
    pub initial_positions: BTreeMap<AgentId, Position>,
    /// The executed agreement, if any.
    pub final_agreement: Option<Agreement>,
    /// True when the session completed.
    pub success: bool,
    /// Status the session ended in.
    pub final_status: NegotiationStatus,
    /// Why the session ended without agreement.
    pub reason: Option<RejectionReason>,
    /// Time from creation to close, in milliseconds.
    pub duration_ms: i64,
    /// Peer offers evaluated by the recording agent.
    pub rounds: u32,
    /// Satisfaction per participant, where known.
    pub satisfaction_scores: BTreeMap<AgentId, f64>,
    /// Short observations for later tuning.
    pub lessons: Vec<String>,
}

impl NegotiationRecord {
    /// Archives `session` as seen by `local_agent`.
    #[must_use]
    pub fn from_session(session: &Negotiation, local_agent: &AgentId) -> Self {
        let mut initial_positions = BTreeMap::new();
        for offer in session.history() {
            initial_positions
                .entry(offer.from_agent().clone())
                .or_insert_with(|| Position {
                    offered: offer.resources_offered().clone(),
                    requested: offer.resources_requested().clone(),
                });
        }

        let mut satisfaction_scores = BTreeMap::new();
        if let Some(score) = session.last_score() {
            satisfaction_scores.insert(local_agent.clone(), score);
        }
        if let Some(score) = session.peer_satisfaction() {
            satisfaction_scores.insert(session.peer().clone(), score);
        }

        let closed_at = session.closed_at().unwrap_or_else(|| session.created_at());
        let status = session.status();

        Self {
            negotiation_id: session.id(),
            participants: session.participants().clone(),
            negotiation_type: session.negotiation_type(),
            initial_positions,
            final_agreement: session.agreement().cloned(),
            success: status == NegotiationStatus::Completed,
            final_status: status,
            reason: session.rejection_reason(),
            duration_ms: (closed_at - session.created_at()).num_milliseconds().max(0),
            rounds: session.current_round(),
            satisfaction_scores,
            lessons: lessons_for(session),
        }
    }

    /// The record of an agreement the peer failed to honor after we executed it.
    #[must_use]
    pub fn compensated(&self, reason: RejectionReason) -> Self {
        let mut record = self.clone();
        record.success = false;
        record.final_status = if reason == RejectionReason::DeadlineExpired {
            NegotiationStatus::Expired
        } else {
            NegotiationStatus::Rejected
        };
        record.reason = Some(reason);
        record.lessons.push(format!("compensated:{reason}"));
        record
    }

    /// The other participant from `agent`'s point of view.
    #[must_use]
    pub fn counterparty_of(&self, agent: &AgentId) -> &AgentId {
        if agent == &self.participants[0] {
            &self.participants[1]
        } else {
            &self.participants[0]
        }
    }
}

fn lessons_for(session: &Negotiation) -> Vec<String> {
    let mut lessons = Vec::new();
    match session.status() {
        NegotiationStatus::Completed | NegotiationStatus::Accepted => {
            let round = session.current_round();
            if round == 0 {
                lessons.push("accepted_by_peer".to_string());
            } else {
                lessons.push(format!("accepted_in_round_{round}"));
            }
        }
        NegotiationStatus::Rejected | NegotiationStatus::Expired => {
            let reason = session
                .rejection_reason()
                .map_or("unspecified", |reason| reason.as_str());
            lessons.push(format!("{}:{reason}", session.status()));
        }
        _ => {}
    }
    if session.current_round() >= session.max_rounds() {
        lessons.push("round_budget_exhausted".to_string());
    }
    if session.our_last_offer().is_some_and(|offer| offer.confidence() < 0.5) {
        lessons.push("low_confidence_final_offer".to_string());
    }
    lessons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::{NegotiationOffer, RequestDetails};
    use chrono::{Duration, Utc};
    use parley_core::ResourceKind;
    use uuid::Uuid;

    fn agent(name: &str) -> AgentId {
        AgentId::new(name).unwrap()
    }

    fn cpu() -> ResourceKind {
        ResourceKind::new("cpu_slots").unwrap()
    }

    #[test]
    fn rejected_session_record() {
        let now = Utc::now();
        let mut session = Negotiation::initiate(
            Uuid::new_v4(),
            NegotiationType::ResourceAllocation,
            agent("fraud_agent"),
            agent("policy_agent"),
            RequestDetails::default(),
            1,
            now + Duration::seconds(30),
            now,
        );
        let opening = NegotiationOffer::builder(agent("fraud_agent"), agent("policy_agent"), NegotiationType::ResourceAllocation)
            .offered(ResourceMap::new().with(cpu(), 2.0))
            .confidence(0.9)
            .build(now);
        session.mark_request_sent(opening, now).unwrap();
        let counter = NegotiationOffer::builder(agent("policy_agent"), agent("fraud_agent"), NegotiationType::ResourceAllocation)
            .requested(ResourceMap::new().with(cpu(), 5.0))
            .build(now);
        session
            .decide(counter, 0.4, 0.8, now + Duration::milliseconds(250))
            .unwrap();

        let record = NegotiationRecord::from_session(&session, &agent("fraud_agent"));

        assert!(!record.success);
        assert_eq!(record.final_status, NegotiationStatus::Rejected);
        assert_eq!(record.reason, Some(RejectionReason::MaxRoundsExceeded));
        assert_eq!(record.rounds, 1);
        assert_eq!(record.duration_ms, 250);
        assert_eq!(record.initial_positions.len(), 2);
        assert_eq!(record.initial_positions[&agent("policy_agent")].requested.get(&cpu()), 5.0);
        assert_eq!(record.satisfaction_scores[&agent("fraud_agent")], 0.4);
        assert_eq!(
            record.lessons,
            vec!["rejected:max_rounds_exceeded".to_string(), "round_budget_exhausted".to_string()]
        );
        assert_eq!(record.counterparty_of(&agent("fraud_agent")), &agent("policy_agent"));
    }

    #[test]
    fn compensation_status_follows_reason() {
        let now = Utc::now();
        let session = Negotiation::initiate(
            Uuid::new_v4(),
            NegotiationType::TaskAssignment,
            agent("fraud_agent"),
            agent("policy_agent"),
            RequestDetails::default(),
            10,
            now + Duration::seconds(30),
            now,
        );
        let record = NegotiationRecord::from_session(&session, &agent("fraud_agent"));

        let expired = record.compensated(RejectionReason::DeadlineExpired);
        assert!(!expired.success);
        assert_eq!(expired.final_status, NegotiationStatus::Expired);
        assert_eq!(expired.lessons.last().unwrap(), "compensated:deadline_expired");

        let rejected = record.compensated(RejectionReason::ResourcesUnavailable);
        assert_eq!(rejected.final_status, NegotiationStatus::Rejected);
        assert_eq!(rejected.reason, Some(RejectionReason::ResourcesUnavailable));
    }
}
