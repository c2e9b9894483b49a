//! Scenario files.
//!
//! A scenario describes a set of agents and the negotiations they open:
//!
//! ```toml
//! [config]
//! max_rounds = 10
//!
//! [[agents]]
//! id = "policy_agent"
//! expertise = ["policy_verification"]
//! resources = { cpu_slots = 10.0 }
//! trust = { fraud_agent = 0.9 }
//!
//! [[negotiations]]
//! initiator = "policy_agent"
//! responder = "fraud_agent"
//! type = "resource_allocation"
//! request = { task = "verify_claim", resources_needed = { gpu_units = 1.0 } }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use parley_agent::{EngineConfig, NegotiationEngine, NegotiationType, RequestDetails};
use parley_core::{AgentCapability, AgentId, NegotiationStyle, ResourceMap, Score};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

/// One agent in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Agent id.
    pub id: AgentId,
    /// Nominal resource capacity.
    #[serde(default)]
    pub resources: ResourceMap,
    /// Expertise areas.
    #[serde(default)]
    pub expertise: Vec<String>,
    /// Starting workload in `[0, 1]`.
    #[serde(default)]
    pub workload: f64,
    /// Counter-offer style.
    #[serde(default)]
    pub style: NegotiationStyle,
    /// Starting trust per peer.
    #[serde(default)]
    pub trust: BTreeMap<AgentId, Score>,
    /// Starting collaboration history per peer.
    #[serde(default)]
    pub collaboration: BTreeMap<AgentId, Score>,
}

impl AgentDefinition {
    /// Builds the agent's starting capability.
    #[must_use]
    pub fn capability(&self) -> AgentCapability {
        let mut builder = AgentCapability::builder(self.id.clone())
            .resources(self.resources.clone())
            .workload(self.workload)
            .style(self.style);
        for area in &self.expertise {
            builder = builder.expertise(area.clone());
        }
        for (peer, score) in &self.trust {
            builder = builder.trust(peer.clone(), *score);
        }
        for (peer, score) in &self.collaboration {
            builder = builder.collaboration(peer.clone(), *score);
        }
        builder.build()
    }
}

/// One negotiation to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationDefinition {
    /// Agent that opens the negotiation.
    pub initiator: AgentId,
    /// Agent it is addressed to.
    pub responder: AgentId,
    /// Negotiation type.
    #[serde(rename = "type", default)]
    pub negotiation_type: NegotiationType,
    /// What the initiator is asking for.
    #[serde(default)]
    pub request: RequestDetails,
}

/// A parsed scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Engine configuration shared by every agent.
    #[serde(default)]
    pub config: EngineConfig,
    /// Participating agents.
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
    /// Negotiations to open, all at once.
    #[serde(default)]
    pub negotiations: Vec<NegotiationDefinition>,
}

impl Scenario {
    /// Load and validate a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| CliError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the scenario is inconsistent.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let scenario: Self = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Validate the scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is out of range, an agent id repeats,
    /// a workload is outside `[0, 1]`, or a negotiation names an unknown
    /// agent or the same agent on both sides.
    pub fn validate(&self) -> Result<(), CliError> {
        self.config.validate()?;

        if self.agents.is_empty() {
            return Err(CliError::Scenario("no agents defined".into()));
        }

        let mut ids = BTreeSet::new();
        for agent in &self.agents {
            if !ids.insert(&agent.id) {
                return Err(CliError::Scenario(format!("duplicate agent {}", agent.id)));
            }
            if !(0.0..=1.0).contains(&agent.workload) {
                return Err(CliError::Scenario(format!(
                    "agent {} workload must be between 0.0 and 1.0, got {}",
                    agent.id, agent.workload
                )));
            }
        }

        for (index, negotiation) in self.negotiations.iter().enumerate() {
            for agent in [&negotiation.initiator, &negotiation.responder] {
                if !ids.contains(agent) {
                    return Err(CliError::Scenario(format!(
                        "negotiation {index} names unknown agent {agent}"
                    )));
                }
            }
            if negotiation.initiator == negotiation.responder {
                return Err(CliError::Scenario(format!(
                    "negotiation {index} has {} on both sides",
                    negotiation.initiator
                )));
            }
        }

        Ok(())
    }

    /// Builds one engine per agent.
    #[must_use]
    pub fn engines(&self) -> Vec<NegotiationEngine> {
        self.agents
            .iter()
            .map(|agent| NegotiationEngine::new(agent.capability(), self.config.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ResourceKind;

    const CLAIMS: &str = r#"
        [config]
        max_rounds = 8

        [[agents]]
        id = "policy_agent"
        expertise = ["policy_verification"]
        resources = { cpu_slots = 10.0 }
        trust = { fraud_agent = 0.9 }

        [[agents]]
        id = "fraud_agent"
        style = "cooperative"
        resources = { gpu_units = 4.0 }

        [[negotiations]]
        initiator = "policy_agent"
        responder = "fraud_agent"
        type = "resource_allocation"
        request = { task = "verify_claim", priority = 0.7, resources_needed = { gpu_units = 1.0 } }
    "#;

    fn agent(name: &str) -> AgentId {
        AgentId::new(name).unwrap()
    }

    #[test]
    fn parses_agents_and_negotiations() {
        let scenario = Scenario::from_toml(CLAIMS).unwrap();

        assert_eq!(scenario.config.max_rounds, 8);
        assert_eq!(scenario.agents.len(), 2);
        assert_eq!(scenario.agents[1].style, NegotiationStyle::Cooperative);

        let negotiation = &scenario.negotiations[0];
        assert_eq!(negotiation.negotiation_type, NegotiationType::ResourceAllocation);
        assert_eq!(negotiation.request.task.as_deref(), Some("verify_claim"));
        let gpu = ResourceKind::new("gpu_units").unwrap();
        assert!((negotiation.request.resources_needed.get(&gpu) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn capability_carries_relationships() {
        let scenario = Scenario::from_toml(CLAIMS).unwrap();
        let capability = scenario.agents[0].capability();

        assert_eq!(capability.trust(&agent("fraud_agent")).value(), 0.9);
        assert!(capability.expertise_areas().contains("policy_verification"));
        assert_eq!(scenario.engines().len(), 2);
    }

    #[test]
    fn rejects_unknown_agent() {
        let toml = r#"
            [[agents]]
            id = "policy_agent"

            [[negotiations]]
            initiator = "policy_agent"
            responder = "ghost_agent"
        "#;
        let err = Scenario::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("unknown agent ghost_agent"));
    }

    #[test]
    fn rejects_duplicate_agent() {
        let toml = r#"
            [[agents]]
            id = "policy_agent"

            [[agents]]
            id = "policy_agent"
        "#;
        assert!(matches!(Scenario::from_toml(toml), Err(CliError::Scenario(_))));
    }

    #[test]
    fn rejects_self_negotiation() {
        let toml = r#"
            [[agents]]
            id = "policy_agent"

            [[negotiations]]
            initiator = "policy_agent"
            responder = "policy_agent"
        "#;
        assert!(matches!(Scenario::from_toml(toml), Err(CliError::Scenario(_))));
    }

    #[test]
    fn rejects_out_of_range_trust() {
        let toml = r#"
            [[agents]]
            id = "policy_agent"
            trust = { fraud_agent = 1.5 }
        "#;
        assert!(matches!(Scenario::from_toml(toml), Err(CliError::Parse(_))));
    }

    #[test]
    fn rejects_invalid_config() {
        let toml = r#"
            [config]
            max_rounds = 0

            [[agents]]
            id = "policy_agent"
        "#;
        assert!(matches!(Scenario::from_toml(toml), Err(CliError::Config(_))));
    }
}
