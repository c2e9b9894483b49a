//! Integration tests for agents running as tokio tasks.
//!
//! Tests the runtime end to end:
//! 1. Two agents negotiate to completion over the local network
//! 2. Concurrent requests cannot overcommit a shared responder
//! 3. Raw wire input is decoded, dropped or refused
//! 4. Queries and invites are answered by running agents

use std::time::Duration;

use parley_agent::{
    AgentHandle, EngineConfig, InviteResponse, LocalNetwork, NegotiationEngine, NegotiationStatus, NegotiationType,
    ProtocolError, RequestDetails, RuntimeError, spawn_agent,
};
use parley_core::{AgentCapability, AgentId, NegotiationStyle, ResourceKind, ResourceMap, Score};
use uuid::Uuid;

// ============================================================================
// Helper Functions
// ============================================================================

fn agent(name: &str) -> AgentId {
    AgentId::new(name).unwrap()
}

fn cpu() -> ResourceKind {
    ResourceKind::new("cpu_slots").unwrap()
}

fn gpu() -> ResourceKind {
    ResourceKind::new("gpu_slots").unwrap()
}

fn config() -> EngineConfig {
    EngineConfig::default().with_sweep_interval(Duration::from_millis(50))
}

fn engine(name: &str, trusted: &[&str], resources: ResourceMap) -> NegotiationEngine {
    let mut builder = AgentCapability::builder(agent(name))
        .resources(resources)
        .expertise("policy_validation");
    for peer in trusted {
        builder = builder
            .trust(agent(peer), Score::new(0.9).unwrap())
            .collaboration(agent(peer), Score::new(0.9).unwrap());
    }
    NegotiationEngine::new(builder.build(), config())
}

fn verify_policy() -> RequestDetails {
    RequestDetails::new("verify_policy")
        .needing(ResourceMap::new().with(cpu(), 4.0))
        .in_return(ResourceMap::new().with(gpu(), 1.0))
        .requiring("policy_validation")
        .with_priority(0.8)
        .with_workload_increase(0.1)
}

async fn wait_for_status(handle: &AgentHandle, negotiation_id: Uuid, expected: NegotiationStatus) {
    for _ in 0..200 {
        if handle.status(negotiation_id).await.ok() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reached {expected}", handle.id());
}

// ============================================================================
// End-to-End Negotiation
// ============================================================================

#[tokio::test]
async fn two_agents_complete_over_local_network() {
    let network = LocalNetwork::new();
    let (fraud, fraud_task) = spawn_agent(
        engine("fraud_agent", &["policy_agent"], ResourceMap::new().with(gpu(), 4.0)),
        &network,
    )
    .unwrap();
    let (policy, policy_task) = spawn_agent(
        engine("policy_agent", &["fraud_agent"], ResourceMap::new().with(cpu(), 10.0)),
        &network,
    )
    .unwrap();
    assert_eq!(network.agents(), vec![agent("fraud_agent"), agent("policy_agent")]);

    let ticket = fraud
        .initiate(policy.id(), NegotiationType::TaskAssignment, verify_policy())
        .await
        .unwrap();
    let id = ticket.negotiation_id();
    let record = ticket.outcome().await.unwrap();

    assert!(record.success);
    assert_eq!(record.final_status, NegotiationStatus::Completed);
    assert_eq!(record.participants, [agent("fraud_agent"), agent("policy_agent")]);

    wait_for_status(&policy, id, NegotiationStatus::Completed).await;
    assert_eq!(fraud.status(id).await.unwrap(), NegotiationStatus::Completed);

    let policy_capability = policy.capability().await.unwrap();
    assert!((policy_capability.available_resources().get(&cpu()) - 6.0).abs() < 1e-9);
    assert_eq!(policy.history().await.unwrap().len(), 1);

    fraud.shutdown().await.unwrap();
    policy.shutdown().await.unwrap();
    let fraud_engine = fraud_task.await.unwrap();
    let policy_engine = policy_task.await.unwrap();

    assert_eq!(fraud_engine.open_sessions(), 0);
    assert_eq!(policy_engine.open_sessions(), 0);
    assert!(network.agents().is_empty());
}

#[tokio::test]
async fn concurrent_requests_cannot_overcommit_responder() {
    let network = LocalNetwork::new();
    let policy_capability = AgentCapability::builder(agent("policy_agent"))
        .resource(cpu(), 10.0)
        .expertise("policy_validation")
        .style(NegotiationStyle::Cooperative)
        .build();
    let (policy, policy_task) = spawn_agent(NegotiationEngine::new(policy_capability, config()), &network).unwrap();

    let hungry = || {
        RequestDetails::new("bulk_review")
            .needing(ResourceMap::new().with(cpu(), 8.0))
            .in_return(ResourceMap::new().with(gpu(), 1.0))
    };

    let mut initiators = Vec::new();
    let mut tickets = Vec::new();
    for name in ["fraud_agent", "claims_agent", "intake_agent"] {
        let (handle, task) = spawn_agent(engine(name, &[], ResourceMap::new().with(gpu(), 2.0)), &network).unwrap();
        tickets.push(
            handle
                .initiate(policy.id(), NegotiationType::ResourceAllocation, hungry())
                .await
                .unwrap(),
        );
        initiators.push((handle, task));
    }

    for ticket in tickets {
        let record = ticket.outcome().await.unwrap();
        assert!(record.final_status.is_terminal());
    }

    policy.shutdown().await.unwrap();
    let policy_engine = policy_task.await.unwrap();

    let completed = policy_engine.history().iter().filter(|record| record.success).count();
    assert_eq!(completed, 1);
    assert!((policy_engine.capability().available_resources().get(&cpu()) - 2.0).abs() < 1e-9);

    for (handle, task) in initiators {
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}

// ============================================================================
// Wire Input
// ============================================================================

#[tokio::test]
async fn raw_messages_are_decoded_dropped_or_refused() {
    let network = LocalNetwork::new();
    let (policy, _task) = spawn_agent(
        engine("policy_agent", &["fraud_agent"], ResourceMap::new().with(cpu(), 10.0)),
        &network,
    )
    .unwrap();

    let unknown = r#"{"from":"fraud_agent","to":"policy_agent","message":{"kind":"heartbeat"}}"#;
    assert_eq!(policy.deliver_raw(unknown).await.unwrap(), None);

    let malformed = r#"{"from":"fraud_agent","to":"policy_agent","message":{"kind":"acceptance"}}"#;
    assert!(matches!(
        policy.deliver_raw(malformed).await,
        Err(RuntimeError::Protocol(ProtocolError::Malformed(_)))
    ));

    let query = r#"{"from":"fraud_agent","to":"policy_agent","message":{"kind":"resource_query"}}"#;
    assert!(policy.deliver_raw(query).await.unwrap().is_some());

    assert!(matches!(
        policy.status(Uuid::new_v4()).await,
        Err(RuntimeError::Protocol(ProtocolError::UnknownNegotiation(_)))
    ));
    assert!(policy.history().await.unwrap().is_empty());

    policy.shutdown().await.unwrap();
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn running_agents_answer_queries_and_invites() {
    let network = LocalNetwork::new();
    let (fraud, _fraud_task) = spawn_agent(
        engine("fraud_agent", &["policy_agent"], ResourceMap::new().with(gpu(), 4.0)),
        &network,
    )
    .unwrap();
    let (policy, _policy_task) = spawn_agent(
        engine("policy_agent", &["fraud_agent"], ResourceMap::new().with(cpu(), 10.0)),
        &network,
    )
    .unwrap();

    let report = fraud.query_resources(policy.id()).await.unwrap();
    assert_eq!(report.agent_id, agent("policy_agent"));
    assert!((report.available_resources.get(&cpu()) - 10.0).abs() < 1e-9);
    assert!(report.expertise_areas.contains("policy_validation"));

    let joint = RequestDetails::new("joint_review").requiring("policy_validation");
    assert!(fraud.invite(policy.id(), joint).await.unwrap().is_accept());

    let foreign = RequestDetails::new("scan_images")
        .requiring("image_forensics")
        .with_priority(0.2);
    assert!(matches!(
        fraud.invite(policy.id(), foreign).await.unwrap(),
        InviteResponse::Decline { .. }
    ));

    fraud.shutdown().await.unwrap();
    policy.shutdown().await.unwrap();
}
