//! Error types for the negotiation agent.

use parley_core::{AgentId, ParleyError};
use thiserror::Error;

use crate::offer::{NegotiationId, OfferId};
use crate::session::{NegotiationStatus, SessionError};

/// Errors raised while handling protocol messages.
///
/// None of these are fatal to the agent: the offending message is refused
/// and every other session carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// No session with this id is known.
    #[error("unknown negotiation: {0}")]
    UnknownNegotiation(NegotiationId),

    /// The session exists but is terminal.
    #[error("negotiation {negotiation_id} is closed ({status})")]
    SessionClosed {
        /// Session id.
        negotiation_id: NegotiationId,
        /// Final status.
        status: NegotiationStatus,
    },

    /// A session with this id already exists.
    #[error("negotiation {0} already exists")]
    DuplicateNegotiation(NegotiationId),

    /// The offer's own deadline has passed.
    #[error("offer {offer_id} has expired")]
    OfferExpired {
        /// Offer id.
        offer_id: OfferId,
    },

    /// The sender is not a participant in the session.
    #[error("agent {agent} is not a participant in negotiation {negotiation_id}")]
    NotParticipant {
        /// Session id.
        negotiation_id: NegotiationId,
        /// Offending sender.
        agent: AgentId,
    },

    /// An acceptance referenced an offer we never made.
    #[error("offer {offer_id} is not part of negotiation {negotiation_id}")]
    UnknownOffer {
        /// Session id.
        negotiation_id: NegotiationId,
        /// Offer id.
        offer_id: OfferId,
    },

    /// An agent tried to negotiate with itself.
    #[error("agent {0} cannot negotiate with itself")]
    SelfNegotiation(AgentId),

    /// The message is structurally invalid.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Session state machine error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Core model error.
    #[error(transparent)]
    Core(#[from] ParleyError),
}

/// Errors raised by the agent runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No agent with this id is registered on the network.
    #[error("agent unavailable: {0}")]
    AgentUnavailable(AgentId),

    /// An agent with this id is already registered.
    #[error("agent already registered: {0}")]
    AlreadyRegistered(AgentId),

    /// The agent task stopped before replying.
    #[error("agent channel closed")]
    ChannelClosed,

    /// The agent refused the request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type for protocol handling.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn session_errors_convert() {
        let err: ProtocolError = SessionError::Closed(NegotiationStatus::Rejected).into();
        assert_eq!(err.to_string(), "session is closed (rejected)");
    }

    #[test]
    fn core_errors_convert() {
        let err: ProtocolError = ParleyError::InvalidScore(2.0).into();
        assert!(matches!(err, ProtocolError::Core(_)));
    }

    #[test]
    fn unknown_negotiation_mentions_id() {
        let id = Uuid::new_v4();
        assert!(ProtocolError::UnknownNegotiation(id).to_string().contains(&id.to_string()));
    }
}
