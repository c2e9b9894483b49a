//! Validated identifiers for agents and resource kinds.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ParleyError;

/// Maximum length of an agent identifier.
pub const MAX_AGENT_ID_LENGTH: usize = 64;

/// Maximum length of a resource kind name.
pub const MAX_RESOURCE_KIND_LENGTH: usize = 48;

/// Agent ids: alphanumeric start, then alphanumerics, `_`, `-` or `.`.
static AGENT_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").unwrap_or_else(|_| unreachable!())
});

/// Resource kinds: lowercase snake case.
static RESOURCE_KIND_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap_or_else(|_| unreachable!()));

/// Identifier of an agent participating in negotiations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Creates a validated agent id.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::InvalidIdentifier`] if the id is empty, too long
    /// or contains characters outside `[a-zA-Z0-9_.-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, ParleyError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ParleyError::InvalidIdentifier {
                value: id,
                reason: "agent id cannot be empty",
            });
        }
        if id.len() > MAX_AGENT_ID_LENGTH {
            return Err(ParleyError::InvalidIdentifier {
                value: id,
                reason: "agent id exceeds 64 characters",
            });
        }
        if !AGENT_ID_REGEX.is_match(&id) {
            return Err(ParleyError::InvalidIdentifier {
                value: id,
                reason: "agent id contains invalid characters",
            });
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AgentId {
    type Error = ParleyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

/// A kind of negotiable resource, e.g. `cpu_slots` or `queue_depth`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKind(String);

impl ResourceKind {
    /// Creates a validated resource kind.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::InvalidIdentifier`] unless the name is lowercase
    /// snake case and at most 48 characters.
    pub fn new(kind: impl Into<String>) -> Result<Self, ParleyError> {
        let kind = kind.into();
        if kind.len() > MAX_RESOURCE_KIND_LENGTH {
            return Err(ParleyError::InvalidIdentifier {
                value: kind,
                reason: "resource kind exceeds 48 characters",
            });
        }
        if !RESOURCE_KIND_REGEX.is_match(&kind) {
            return Err(ParleyError::InvalidIdentifier {
                value: kind,
                reason: "resource kind must be lowercase snake case",
            });
        }
        Ok(Self(kind))
    }

    /// Returns the kind as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = ParleyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("fraud_agent" ; "snake case")]
    #[test_case("investigation-agent.2" ; "dash and dot")]
    #[test_case("A1" ; "short alphanumeric")]
    fn agent_id_accepts(id: &str) {
        assert_eq!(AgentId::new(id).unwrap().as_str(), id);
    }

    #[test_case("" ; "empty")]
    #[test_case("_leading" ; "leading underscore")]
    #[test_case("has space" ; "whitespace")]
    #[test_case("semi;colon" ; "metacharacter")]
    fn agent_id_rejects(id: &str) {
        assert!(AgentId::new(id).is_err());
    }

    #[test]
    fn agent_id_rejects_too_long() {
        let id = "a".repeat(MAX_AGENT_ID_LENGTH + 1);
        assert!(AgentId::new(id).is_err());
    }

    #[test_case("cpu_slots", true ; "snake case")]
    #[test_case("queue_depth2", true ; "trailing digit")]
    #[test_case("CPU", false ; "uppercase")]
    #[test_case("2cpu", false ; "leading digit")]
    #[test_case("cpu-slots", false ; "dash")]
    fn resource_kind_validation(kind: &str, ok: bool) {
        assert_eq!(ResourceKind::new(kind).is_ok(), ok);
    }

    #[test]
    fn agent_id_deserialization_validates() {
        let ok: Result<AgentId, _> = serde_json::from_str("\"policy_agent\"");
        assert!(ok.is_ok());

        let bad: Result<AgentId, _> = serde_json::from_str("\"bad id\"");
        assert!(bad.is_err());
    }

    #[test]
    fn resource_kind_serializes_as_plain_string() {
        let kind = ResourceKind::new("cpu_slots").unwrap();
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"cpu_slots\"");
    }
}
