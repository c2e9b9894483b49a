//! # parley-core
//!
//! Primitives shared by every Parley agent.
//!
//! This crate provides:
//!
//! - [`AgentId`] and [`ResourceKind`] — validated identifiers
//! - [`ResourceMap`] — non-negative resource amounts keyed by kind
//! - [`Score`] — a value clamped to `[0.0, 1.0]` used for trust and history
//! - [`AgentCapability`] — an agent's resources, expertise, workload and relationships
//!
//! ## Example
//!
//! ```rust
//! use parley_core::{AgentCapability, AgentId, ResourceKind};
//!
//! let cpu = ResourceKind::new("cpu_slots").unwrap();
//! let capability = AgentCapability::builder(AgentId::new("fraud_agent").unwrap())
//!     .resource(cpu.clone(), 8.0)
//!     .workload(0.25)
//!     .build();
//!
//! assert_eq!(capability.available_now().get(&cpu), 6.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capability;
pub mod error;
pub mod ids;
pub mod resources;
pub mod score;

pub use capability::{AgentCapability, CapabilityBuilder, Constraint, ConstraintThresholds, NegotiationStyle};
pub use error::ParleyError;
pub use ids::{AgentId, ResourceKind};
pub use resources::ResourceMap;
pub use score::Score;
