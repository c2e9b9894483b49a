//! Error types for parley-core.

use thiserror::Error;

/// Errors that can occur in Parley core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParleyError {
    /// Identifier failed validation.
    #[error("invalid identifier '{value}': {reason}")]
    InvalidIdentifier {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Score outside `[0.0, 1.0]` or not a number.
    #[error("score must be between 0.0 and 1.0, got {0}")]
    InvalidScore(f64),

    /// Resource amount negative or not finite.
    #[error("invalid resource amount for {kind}: {amount}")]
    InvalidAmount {
        /// Resource kind.
        kind: String,
        /// Rejected amount.
        amount: f64,
    },

    /// A reservation asked for more than is currently available.
    #[error("insufficient {kind}: requested {requested:.3}, available {available:.3}")]
    InsufficientResources {
        /// Resource kind that could not be covered.
        kind: String,
        /// Amount requested.
        requested: f64,
        /// Effective amount available.
        available: f64,
    },
}
