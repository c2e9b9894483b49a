//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use parley_agent::NegotiationRecord;
use parley_core::{AgentId, ResourceMap};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Final state of one agent after a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    /// Agent id.
    pub id: AgentId,
    /// Effective availability at shutdown.
    pub available: ResourceMap,
    /// Workload at shutdown.
    pub workload: f64,
    /// Archived sessions.
    pub archived: usize,
    /// Archived sessions that completed.
    pub completed: usize,
}

/// Everything a simulation produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// One record per scenario negotiation, as seen by its initiator.
    pub outcomes: Vec<NegotiationRecord>,
    /// Agent state at shutdown. Empty when only outcomes were requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentSummary>,
}

impl TableDisplay for SimulationReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.outcomes.is_empty() {
            writeln!(writer, "No negotiations in scenario")?;
        } else {
            writeln!(
                writer,
                "{:<36}  {:<16}  {:<16}  {:<22}  {:<9}  {:>6}  {:<24}",
                "NEGOTIATION", "INITIATOR", "RESPONDER", "TYPE", "STATUS", "ROUNDS", "REASON"
            )?;
            writeln!(writer, "{}", "─".repeat(141))?;
            for record in &self.outcomes {
                let [initiator, responder] = &record.participants;
                writeln!(
                    writer,
                    "{:<36}  {:<16}  {:<16}  {:<22}  {:<9}  {:>6}  {:<24}",
                    record.negotiation_id.to_string(),
                    truncate(initiator.as_str(), 16),
                    truncate(responder.as_str(), 16),
                    record.negotiation_type.as_str(),
                    record.final_status.as_str(),
                    record.rounds,
                    record.reason.map_or("-", |reason| reason.as_str()),
                )?;
            }
            let completed = self.outcomes.iter().filter(|record| record.success).count();
            writeln!(writer)?;
            writeln!(writer, "Total: {} negotiation(s), {completed} completed", self.outcomes.len())?;
        }

        if !self.agents.is_empty() {
            writeln!(writer)?;
            writeln!(
                writer,
                "{:<16}  {:>8}  {:>8}  {:>9}  {:<40}",
                "AGENT", "WORKLOAD", "ARCHIVED", "COMPLETED", "AVAILABLE"
            )?;
            writeln!(writer, "{}", "─".repeat(89))?;
            for agent in &self.agents {
                writeln!(
                    writer,
                    "{:<16}  {:>8.2}  {:>8}  {:>9}  {:<40}",
                    truncate(agent.id.as_str(), 16),
                    agent.workload,
                    agent.archived,
                    agent.completed,
                    format_resources(&agent.available),
                )?;
            }
        }
        Ok(())
    }
}

/// Result of `parley validate`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    /// Path that was checked.
    pub scenario: String,
    /// Number of agents.
    pub agents: usize,
    /// Number of negotiations.
    pub negotiations: usize,
}

impl TableDisplay for ValidationSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Scenario OK: {}", self.scenario)?;
        writeln!(writer, "  Agents:         {}", self.agents)?;
        writeln!(writer, "  Negotiations:   {}", self.negotiations)?;
        Ok(())
    }
}

fn format_resources(resources: &ResourceMap) -> String {
    if resources.is_empty() {
        return "-".to_string();
    }
    resources
        .iter()
        .map(|(kind, amount)| format!("{kind}={amount:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ResourceKind;

    fn summary() -> AgentSummary {
        AgentSummary {
            id: AgentId::new("policy_agent").unwrap(),
            available: ResourceMap::new().with(ResourceKind::new("cpu_slots").unwrap(), 6.0),
            workload: 0.1,
            archived: 1,
            completed: 1,
        }
    }

    #[test]
    fn empty_report_table() {
        let report = SimulationReport {
            outcomes: Vec::new(),
            agents: Vec::new(),
        };
        let output = OutputFormat::new(Format::Table).to_string(&report).unwrap();
        assert_eq!(output, "No negotiations in scenario\n");
    }

    #[test]
    fn agent_table_lists_resources() {
        let report = SimulationReport {
            outcomes: Vec::new(),
            agents: vec![summary()],
        };
        let output = OutputFormat::default().to_string(&report).unwrap();
        assert!(output.contains("policy_agent"));
        assert!(output.contains("cpu_slots=6.00"));
        assert!(output.contains("0.10"));
    }

    #[test]
    fn report_json_skips_empty_agents() {
        let report = SimulationReport {
            outcomes: Vec::new(),
            agents: Vec::new(),
        };
        let output = OutputFormat::new(Format::Json).to_string(&report).unwrap();
        assert!(output.contains("\"outcomes\": []"));
        assert!(!output.contains("agents"));
    }

    #[test]
    fn validation_summary_table() {
        let summary = ValidationSummary {
            scenario: "claims.toml".into(),
            agents: 3,
            negotiations: 2,
        };
        let output = OutputFormat::default().to_string(&summary).unwrap();
        assert!(output.starts_with("Scenario OK: claims.toml"));
        assert!(output.contains("Negotiations:   2"));
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("short", 16), "short");
        assert_eq!(truncate("a_very_long_agent_name", 8), "a_very_…");
    }
}
