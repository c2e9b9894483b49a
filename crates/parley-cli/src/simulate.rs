//! Runs a scenario on the in-process runtime.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use parley_agent::{LocalNetwork, NegotiationTicket, spawn_agent};
use tracing::info;

use crate::error::CliError;
use crate::output::{AgentSummary, SimulationReport};
use crate::scenario::Scenario;

/// Spawns every scenario agent, opens every negotiation at once and waits
/// for all of them to close.
///
/// Outcomes are reported in scenario order, as recorded by each initiator.
///
/// # Errors
///
/// Returns an error if an agent fails to start, a negotiation cannot be
/// opened, or the negotiations do not finish within `timeout`.
pub async fn simulate(scenario: &Scenario, timeout: Duration, with_agents: bool) -> Result<SimulationReport, CliError> {
    let network = LocalNetwork::new();
    let mut handles = BTreeMap::new();
    let mut tasks = Vec::with_capacity(scenario.agents.len());
    for engine in scenario.engines() {
        let (handle, task) = spawn_agent(engine, &network)?;
        handles.insert(handle.id().clone(), handle);
        tasks.push(task);
    }

    let mut tickets = Vec::with_capacity(scenario.negotiations.len());
    for negotiation in &scenario.negotiations {
        let handle = handles
            .get(&negotiation.initiator)
            .ok_or_else(|| CliError::Scenario(format!("unknown agent {}", negotiation.initiator)))?;
        let ticket = handle
            .initiate(&negotiation.responder, negotiation.negotiation_type, negotiation.request.clone())
            .await?;
        tickets.push(ticket);
    }
    info!(
        agents = handles.len(),
        negotiations = tickets.len(),
        "simulation started"
    );

    let outcomes = tokio::time::timeout(timeout, join_all(tickets.into_iter().map(NegotiationTicket::outcome)))
        .await
        .map_err(|_| CliError::Timeout(timeout.as_secs()))?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    for handle in handles.values() {
        handle.shutdown().await?;
    }

    let mut agents = Vec::with_capacity(tasks.len());
    for engine in join_all(tasks).await {
        let engine = engine?;
        let capability = engine.capability();
        agents.push(AgentSummary {
            id: engine.agent_id().clone(),
            available: capability.available_now(),
            workload: capability.current_workload(),
            archived: engine.history().len(),
            completed: engine.history().iter().filter(|record| record.success).count(),
        });
    }

    let completed = outcomes.iter().filter(|record| record.success).count();
    info!(negotiations = outcomes.len(), completed, "simulation finished");

    Ok(SimulationReport {
        outcomes,
        agents: if with_agents { agents } else { Vec::new() },
    })
}
