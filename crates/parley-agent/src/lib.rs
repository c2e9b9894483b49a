//! # parley-agent
//!
//! Decentralized negotiation between claims-processing agents.
//!
//! Each agent runs a [`NegotiationEngine`] that owns its capability, its open
//! sessions and its archive of past negotiations. Agents exchange typed
//! [`ProtocolMessage`]s; the engine gates participation, scores offers,
//! counters with strategy-adjusted terms, executes agreements and learns
//! trust from the outcome.
//!
//! ## Modules
//!
//! - [`offer`] — offers, request details and agreements
//! - [`message`] — the wire protocol and local replies
//! - [`session`] — the per-negotiation state machine
//! - [`evaluation`] — offer scoring and term generation
//! - [`strategy`] — pluggable domain hooks
//! - [`learner`] — trust and collaboration updates
//! - [`engine`] — the per-agent engine
//! - [`dispatch`] — message routing and the wire codec
//! - [`runtime`] — task-per-agent async runtime
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use parley_agent::{EngineConfig, NegotiationEngine, NegotiationType, RequestDetails};
//! use parley_core::{AgentCapability, AgentId, ResourceKind, ResourceMap};
//!
//! let cpu = ResourceKind::new("cpu_slots").unwrap();
//! let fraud = AgentId::new("fraud_agent").unwrap();
//! let policy = AgentId::new("policy_agent").unwrap();
//!
//! let mut engine = NegotiationEngine::new(
//!     AgentCapability::builder(fraud).resource(cpu.clone(), 4.0).build(),
//!     EngineConfig::default(),
//! );
//! let request = RequestDetails::new("verify_policy").needing(ResourceMap::new().with(cpu, 2.0));
//! let (id, envelope) = engine
//!     .initiate(&policy, NegotiationType::ResourceAllocation, request, Utc::now())
//!     .unwrap();
//!
//! assert_eq!(envelope.to, policy);
//! assert!(engine.session(id).is_some());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod history;
pub mod learner;
pub mod message;
pub mod offer;
pub mod runtime;
pub mod session;
pub mod strategy;

pub use config::{ConfigError, EngineConfig, LearningConfig, OfferLifetimes, ParticipationThresholds, RuntimeConfig};
pub use dispatch::{Handled, decode, encode};
pub use engine::{NegotiationEngine, ParticipationDecision};
pub use error::{ProtocolError, ProtocolResult, RuntimeError, RuntimeResult};
pub use evaluation::{OfferScore, Terms};
pub use history::{NegotiationRecord, Position};
pub use learner::{RejectionLog, TrustLearner};
pub use message::{
    Alternative, DeclineReason, Envelope, InviteResponse, MessageKind, ProtocolMessage, RejectionReason, Reply,
    ResourceReport,
};
pub use offer::{Agreement, NegotiationId, NegotiationOffer, NegotiationType, OfferId, Proposal, RequestDetails};
pub use runtime::{AgentHandle, LocalNetwork, NegotiationTicket, spawn_agent};
pub use session::{Negotiation, NegotiationRole, NegotiationStatus, SessionError};
pub use strategy::{DefaultHooks, NegotiationHooks, StrategyFactors};
