//! Inbound message dispatch.
//!
//! Every [`MessageKind`] maps to exactly one engine handler. Raw JSON is
//! checked against the dispatch table before it is decoded, so messages of a
//! kind this agent does not speak are dropped rather than treated as errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::NegotiationEngine;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Envelope, MessageKind, ProtocolMessage, Reply};
use crate::strategy::NegotiationHooks;

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handled {
    /// What happened locally.
    pub reply: Reply,
    /// Messages to deliver to peers.
    pub outbound: Vec<Envelope>,
}

impl Handled {
    /// A reply with nothing to send.
    #[must_use]
    pub const fn new(reply: Reply) -> Self {
        Self {
            reply,
            outbound: Vec::new(),
        }
    }

    /// Adds an outbound envelope.
    #[must_use]
    pub fn send(mut self, envelope: Envelope) -> Self {
        self.outbound.push(envelope);
        self
    }
}

/// Routes `envelope` to the engine handler for its kind.
///
/// # Errors
///
/// Returns an error if the envelope is addressed to another agent or the
/// handler refuses the message.
pub fn dispatch<H: NegotiationHooks>(
    engine: &mut NegotiationEngine<H>,
    envelope: Envelope,
    now: DateTime<Utc>,
) -> ProtocolResult<Handled> {
    let Envelope { from, to, message } = envelope;
    if &to != engine.agent_id() {
        return Err(ProtocolError::Malformed(format!(
            "envelope for {to} delivered to {}",
            engine.agent_id()
        )));
    }

    debug!(kind = %message.kind(), from = %from, "dispatching message");

    match message {
        ProtocolMessage::NegotiationRequest {
            negotiation_id,
            from_agent,
            negotiation_type,
            initial_offer,
            deadline,
            request_details,
        } => {
            if from_agent != from {
                return Err(ProtocolError::Malformed(format!(
                    "request names {from_agent} as sender but came from {from}"
                )));
            }
            engine.on_negotiation_request(
                &from,
                negotiation_id,
                negotiation_type,
                initial_offer,
                deadline,
                request_details,
                now,
            )
        }
        ProtocolMessage::Offer { negotiation_id, offer }
        | ProtocolMessage::CounterOffer { negotiation_id, offer, .. } => {
            engine.on_offer(&from, negotiation_id, offer, now)
        }
        ProtocolMessage::Acceptance {
            negotiation_id,
            agreement,
            satisfaction_score,
        } => engine.on_acceptance(&from, negotiation_id, agreement, satisfaction_score, now),
        ProtocolMessage::Rejection {
            negotiation_id,
            reason,
            ..
        } => engine.on_rejection(&from, negotiation_id, reason, now),
        ProtocolMessage::ResourceQuery => Ok(engine.on_resource_query(&from)),
        ProtocolMessage::CollaborationInvite { details } => {
            Ok(engine.on_collaboration_invite(&from, &details))
        }
    }
}

/// Decodes a wire envelope.
///
/// Returns `Ok(None)` for messages whose kind is not in the dispatch table.
///
/// # Errors
///
/// Returns `ProtocolError::Malformed` if the JSON is invalid, has no kind, or
/// does not match the shape of its kind.
pub fn decode(raw: &str) -> ProtocolResult<Option<Envelope>> {
    let value: Value = serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("message")
        .and_then(|message| message.get("kind"))
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing message kind".to_string()))?;

    if MessageKind::from_wire(kind).is_none() {
        warn!(kind = %kind, "dropping message of unknown kind");
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encodes an envelope for the wire.
///
/// # Errors
///
/// Returns `ProtocolError::Malformed` if serialization fails.
pub fn encode(envelope: &Envelope) -> ProtocolResult<String> {
    serde_json::to_string(envelope).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::offer::{NegotiationType, RequestDetails};
    use parley_core::{AgentCapability, AgentId};

    fn agent(name: &str) -> AgentId {
        AgentId::new(name).unwrap()
    }

    #[test]
    fn unknown_kind_is_dropped() {
        let raw = r#"{"from":"fraud_agent","to":"policy_agent","message":{"kind":"gossip","rumor":"x"}}"#;
        assert_eq!(decode(raw).unwrap(), None);
    }

    #[test]
    fn missing_kind_is_malformed() {
        let raw = r#"{"from":"fraud_agent","to":"policy_agent","message":{}}"#;
        assert!(matches!(decode(raw), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn known_kind_with_wrong_shape_is_malformed() {
        let raw = r#"{"from":"fraud_agent","to":"policy_agent","message":{"kind":"offer"}}"#;
        assert!(matches!(decode(raw), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn request_survives_the_wire() {
        let now = Utc::now();
        let mut engine = NegotiationEngine::new(
            AgentCapability::builder(agent("fraud_agent")).build(),
            EngineConfig::default(),
        );
        let (_, envelope) = engine
            .initiate(&agent("policy_agent"), NegotiationType::InformationSharing, RequestDetails::new("share_findings"), now)
            .unwrap();

        let raw = encode(&envelope).unwrap();
        assert!(raw.contains(r#""kind":"negotiation_request""#));
        assert_eq!(decode(&raw).unwrap(), Some(envelope));
    }

    #[test]
    fn misaddressed_envelope_is_refused() {
        let mut engine = NegotiationEngine::new(
            AgentCapability::builder(agent("policy_agent")).build(),
            EngineConfig::default(),
        );
        let envelope = Envelope::new(agent("fraud_agent"), agent("claims_agent"), ProtocolMessage::ResourceQuery);
        assert!(matches!(engine.handle(envelope, Utc::now()), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn spoofed_request_sender_is_refused() {
        let now = Utc::now();
        let mut initiator = NegotiationEngine::new(
            AgentCapability::builder(agent("fraud_agent")).build(),
            EngineConfig::default(),
        );
        let mut responder = NegotiationEngine::new(
            AgentCapability::builder(agent("policy_agent")).build(),
            EngineConfig::default(),
        );
        let (_, mut envelope) = initiator
            .initiate(&agent("policy_agent"), NegotiationType::TaskAssignment, RequestDetails::default(), now)
            .unwrap();
        envelope.from = agent("claims_agent");

        assert!(matches!(responder.handle(envelope, now), Err(ProtocolError::Malformed(_))));
        assert_eq!(responder.open_sessions(), 0);
    }
}
