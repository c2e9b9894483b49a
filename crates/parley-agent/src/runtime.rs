//! In-process agent runtime.
//!
//! Each agent runs as its own tokio task that exclusively owns a
//! [`NegotiationEngine`]. Agents never share mutable state; they talk by
//! sending [`Envelope`]s over bounded channels routed by a [`LocalNetwork`].
//! Callers interact with an agent through its [`AgentHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use parley_core::{AgentCapability, AgentId};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatch;
use crate::engine::NegotiationEngine;
use crate::error::{ProtocolError, ProtocolResult, RuntimeError, RuntimeResult};
use crate::history::NegotiationRecord;
use crate::message::{Envelope, InviteResponse, ProtocolMessage, RejectionReason, Reply, ResourceReport};
use crate::offer::{NegotiationId, NegotiationType, RequestDetails};
use crate::session::NegotiationStatus;
use crate::strategy::NegotiationHooks;

/// Work sent to an agent task.
#[derive(Debug)]
enum Command {
    Deliver {
        envelope: Envelope,
        respond: Option<oneshot::Sender<ProtocolResult<Reply>>>,
    },
    DeliverRaw {
        raw: String,
        respond: oneshot::Sender<ProtocolResult<Option<Reply>>>,
    },
    Initiate {
        peer: AgentId,
        negotiation_type: NegotiationType,
        request: RequestDetails,
        respond: oneshot::Sender<ProtocolResult<NegotiationTicket>>,
    },
    Status {
        negotiation_id: NegotiationId,
        respond: oneshot::Sender<ProtocolResult<NegotiationStatus>>,
    },
    Capability {
        respond: oneshot::Sender<AgentCapability>,
    },
    History {
        respond: oneshot::Sender<Vec<NegotiationRecord>>,
    },
    Shutdown,
}

/// Routes envelopes between agents running in the same process.
#[derive(Debug, Clone, Default)]
pub struct LocalNetwork {
    routes: Arc<RwLock<HashMap<AgentId, mpsc::Sender<Command>>>>,
}

impl LocalNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Agents currently registered.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.routes.read().keys().cloned().collect();
        agents.sort();
        agents
    }

    /// Returns true if `agent` is registered.
    #[must_use]
    pub fn contains(&self, agent: &AgentId) -> bool {
        self.routes.read().contains_key(agent)
    }

    fn register(&self, agent: AgentId, sender: mpsc::Sender<Command>) -> RuntimeResult<()> {
        let mut routes = self.routes.write();
        if routes.contains_key(&agent) {
            return Err(RuntimeError::AlreadyRegistered(agent));
        }
        routes.insert(agent, sender);
        Ok(())
    }

    fn unregister(&self, agent: &AgentId) {
        self.routes.write().remove(agent);
    }

    fn route(&self, agent: &AgentId) -> RuntimeResult<mpsc::Sender<Command>> {
        self.routes
            .read()
            .get(agent)
            .cloned()
            .ok_or_else(|| RuntimeError::AgentUnavailable(agent.clone()))
    }

    /// Delivers `envelope` to its recipient without waiting for a reply.
    fn send(&self, envelope: Envelope) -> RuntimeResult<()> {
        let to = envelope.to.clone();
        let sender = self.route(&to)?;
        match sender.try_send(Command::Deliver {
            envelope,
            respond: None,
        }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                debug!(peer = %to, "inbox full, delivering in background");
                tokio::spawn(async move {
                    if sender.send(command).await.is_err() {
                        warn!(peer = %to, "peer stopped before delivery");
                    }
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(RuntimeError::AgentUnavailable(to)),
        }
    }
}

/// A negotiation started through [`AgentHandle::initiate`].
///
/// The ticket is returned as soon as the request is sent; await
/// [`outcome`](Self::outcome) for the archived result.
#[derive(Debug)]
pub struct NegotiationTicket {
    negotiation_id: NegotiationId,
    outcome: oneshot::Receiver<NegotiationRecord>,
}

impl NegotiationTicket {
    /// Session id.
    #[must_use]
    pub const fn negotiation_id(&self) -> NegotiationId {
        self.negotiation_id
    }

    /// Waits for the session to reach a terminal status.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::ChannelClosed` if the agent stopped first.
    pub async fn outcome(self) -> RuntimeResult<NegotiationRecord> {
        self.outcome.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

/// Client handle to a running agent.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    id: AgentId,
    tx: mpsc::Sender<Command>,
    network: LocalNetwork,
}

impl AgentHandle {
    /// The agent's id.
    #[must_use]
    pub const fn id(&self) -> &AgentId {
        &self.id
    }

    /// Opens a negotiation with `peer`.
    ///
    /// Returns once the request is sent; the ticket resolves when the
    /// session closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent has stopped or refuses the request.
    pub async fn initiate(
        &self,
        peer: &AgentId,
        negotiation_type: NegotiationType,
        request: RequestDetails,
    ) -> RuntimeResult<NegotiationTicket> {
        let peer = peer.clone();
        let ticket = ask(&self.tx, |respond| Command::Initiate {
            peer,
            negotiation_type,
            request,
            respond,
        })
        .await??;
        Ok(ticket)
    }

    /// Asks `target` for its current availability.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is not running.
    pub async fn query_resources(&self, target: &AgentId) -> RuntimeResult<ResourceReport> {
        match self.ask_peer(target, ProtocolMessage::ResourceQuery).await? {
            Reply::Resources(report) => Ok(report),
            other => Err(unexpected(&other)),
        }
    }

    /// Invites `target` to collaborate on `details`.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is not running.
    pub async fn invite(&self, target: &AgentId, details: RequestDetails) -> RuntimeResult<InviteResponse> {
        match self
            .ask_peer(target, ProtocolMessage::CollaborationInvite { details })
            .await?
        {
            Reply::Invitation(response) => Ok(response),
            other => Err(unexpected(&other)),
        }
    }

    /// Status of a session on this agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent has stopped or the id is unknown.
    pub async fn status(&self, negotiation_id: NegotiationId) -> RuntimeResult<NegotiationStatus> {
        let status = ask(&self.tx, |respond| Command::Status {
            negotiation_id,
            respond,
        })
        .await??;
        Ok(status)
    }

    /// Snapshot of the agent's capability.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent has stopped.
    pub async fn capability(&self) -> RuntimeResult<AgentCapability> {
        ask(&self.tx, |respond| Command::Capability { respond }).await
    }

    /// The agent's archived sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent has stopped.
    pub async fn history(&self) -> RuntimeResult<Vec<NegotiationRecord>> {
        ask(&self.tx, |respond| Command::History { respond }).await
    }

    /// Hands an envelope directly to this agent and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent has stopped or refuses the message.
    pub async fn deliver(&self, envelope: Envelope) -> RuntimeResult<Reply> {
        let reply = ask(&self.tx, |respond| Command::Deliver {
            envelope,
            respond: Some(respond),
        })
        .await??;
        Ok(reply)
    }

    /// Hands a wire-encoded envelope to this agent.
    ///
    /// Returns `Ok(None)` when the message kind is unknown and was dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent has stopped or the message is malformed
    /// or refused.
    pub async fn deliver_raw(&self, raw: impl Into<String>) -> RuntimeResult<Option<Reply>> {
        let raw = raw.into();
        let reply = ask(&self.tx, |respond| Command::DeliverRaw { raw, respond }).await??;
        Ok(reply)
    }

    /// Stops the agent task.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent has already stopped.
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    async fn ask_peer(&self, target: &AgentId, message: ProtocolMessage) -> RuntimeResult<Reply> {
        let sender = self.network.route(target)?;
        let envelope = Envelope::new(self.id.clone(), target.clone(), message);
        let reply = ask(&sender, |respond| Command::Deliver {
            envelope,
            respond: Some(respond),
        })
        .await??;
        Ok(reply)
    }
}

async fn ask<T>(sender: &mpsc::Sender<Command>, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> RuntimeResult<T> {
    let (respond, response) = oneshot::channel();
    sender
        .send(build(respond))
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?;
    response.await.map_err(|_| RuntimeError::ChannelClosed)
}

fn unexpected(reply: &Reply) -> RuntimeError {
    RuntimeError::Protocol(ProtocolError::Malformed(format!("unexpected reply: {reply:?}")))
}

/// Starts `engine` as an agent task registered on `network`.
///
/// The join handle yields the engine back after [`AgentHandle::shutdown`].
///
/// # Errors
///
/// Returns `RuntimeError::AlreadyRegistered` if an agent with the same id is
/// already running on `network`.
pub fn spawn_agent<H: NegotiationHooks + 'static>(
    engine: NegotiationEngine<H>,
    network: &LocalNetwork,
) -> RuntimeResult<(AgentHandle, JoinHandle<NegotiationEngine<H>>)> {
    let id = engine.agent_id().clone();
    let (tx, inbox) = mpsc::channel(engine.config().runtime.channel_buffer);
    network.register(id.clone(), tx.clone())?;

    let task = AgentTask {
        engine,
        inbox,
        network: network.clone(),
        waiters: HashMap::new(),
    };
    let join = tokio::spawn(task.run());

    Ok((
        AgentHandle {
            id,
            tx,
            network: network.clone(),
        },
        join,
    ))
}

struct AgentTask<H: NegotiationHooks> {
    engine: NegotiationEngine<H>,
    inbox: mpsc::Receiver<Command>,
    network: LocalNetwork,
    waiters: HashMap<NegotiationId, oneshot::Sender<NegotiationRecord>>,
}

impl<H: NegotiationHooks> AgentTask<H> {
    async fn run(mut self) -> NegotiationEngine<H> {
        let mut sweep = tokio::time::interval(self.engine.config().sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(agent = %self.engine.agent_id(), "agent started");

        loop {
            tokio::select! {
                command = self.inbox.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.execute(command),
                },
                _ = sweep.tick() => {
                    let outbound = self.engine.expire_stale(Utc::now());
                    self.route(outbound);
                }
            }
            self.notify_waiters();
        }

        self.network.unregister(self.engine.agent_id());
        info!(
            agent = %self.engine.agent_id(),
            open_sessions = self.engine.open_sessions(),
            archived = self.engine.history().len(),
            "agent stopped"
        );
        self.engine
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Deliver { envelope, respond } => {
                let result = self.deliver(envelope);
                if let Some(respond) = respond {
                    reply(respond, result);
                }
            }
            Command::DeliverRaw { raw, respond } => {
                let result = match dispatch::decode(&raw) {
                    Ok(Some(envelope)) => self.deliver(envelope).map(Some),
                    Ok(None) => Ok(None),
                    Err(err) => Err(err),
                };
                reply(respond, result);
            }
            Command::Initiate {
                peer,
                negotiation_type,
                request,
                respond,
            } => {
                let result = self.initiate(&peer, negotiation_type, request);
                reply(respond, result);
            }
            Command::Status {
                negotiation_id,
                respond,
            } => reply(respond, self.engine.status(negotiation_id, Utc::now())),
            Command::Capability { respond } => reply(respond, self.engine.capability().clone()),
            Command::History { respond } => reply(respond, self.engine.history().to_vec()),
            Command::Shutdown => {}
        }
    }

    fn deliver(&mut self, envelope: Envelope) -> ProtocolResult<Reply> {
        let kind = envelope.message.kind();
        let from = envelope.from.clone();
        match self.engine.handle(envelope, Utc::now()) {
            Ok(handled) => {
                self.route(handled.outbound);
                Ok(handled.reply)
            }
            Err(err) => {
                warn!(agent = %self.engine.agent_id(), peer = %from, kind = %kind, error = %err, "message refused");
                Err(err)
            }
        }
    }

    fn initiate(
        &mut self,
        peer: &AgentId,
        negotiation_type: NegotiationType,
        request: RequestDetails,
    ) -> ProtocolResult<NegotiationTicket> {
        let (negotiation_id, envelope) = self
            .engine
            .initiate(peer, negotiation_type, request, Utc::now())?;
        let (tx, outcome) = oneshot::channel();
        self.waiters.insert(negotiation_id, tx);
        self.route(vec![envelope]);
        Ok(NegotiationTicket {
            negotiation_id,
            outcome,
        })
    }

    fn route(&mut self, outbound: Vec<Envelope>) {
        for envelope in outbound {
            let negotiation_id = envelope.message.negotiation_id();
            let to = envelope.to.clone();
            let Err(err) = self.network.send(envelope) else {
                continue;
            };
            warn!(agent = %self.engine.agent_id(), peer = %to, error = %err, "peer unreachable");
            if let Some(negotiation_id) = negotiation_id {
                if let Err(err) = self
                    .engine
                    .abort(negotiation_id, RejectionReason::PeerUnreachable, Utc::now())
                {
                    debug!(negotiation_id = %negotiation_id, error = %err, "nothing to abort");
                }
            }
        }
    }

    fn notify_waiters(&mut self) {
        let finished: Vec<NegotiationId> = self
            .waiters
            .keys()
            .filter(|id| self.engine.record(**id).is_some())
            .copied()
            .collect();

        for negotiation_id in finished {
            let (Some(waiter), Some(record)) = (
                self.waiters.remove(&negotiation_id),
                self.engine.record(negotiation_id),
            ) else {
                continue;
            };
            if waiter.send(record.clone()).is_err() {
                debug!(negotiation_id = %negotiation_id, "ticket dropped before outcome");
            }
        }
    }
}

fn reply<T>(respond: oneshot::Sender<T>, value: T) {
    if respond.send(value).is_err() {
        debug!("caller went away before reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use parley_core::{ResourceKind, ResourceMap, Score};

    fn agent(name: &str) -> AgentId {
        AgentId::new(name).unwrap()
    }

    fn cpu() -> ResourceKind {
        ResourceKind::new("cpu_slots").unwrap()
    }

    fn engine(name: &str, cpu_slots: f64) -> NegotiationEngine {
        NegotiationEngine::new(
            AgentCapability::builder(agent(name))
                .resource(cpu(), cpu_slots)
                .expertise("fraud_detection")
                .build(),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn duplicate_registration_is_refused() {
        let network = LocalNetwork::new();
        let (handle, _join) = spawn_agent(engine("fraud_agent", 1.0), &network).unwrap();

        let err = spawn_agent(engine("fraud_agent", 1.0), &network).unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyRegistered(_)));
        assert_eq!(network.agents(), vec![agent("fraud_agent")]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_returns_engine_and_unregisters() {
        let network = LocalNetwork::new();
        let (handle, join) = spawn_agent(engine("fraud_agent", 4.0), &network).unwrap();

        handle.shutdown().await.unwrap();
        let engine = join.await.unwrap();

        assert_eq!(engine.agent_id(), &agent("fraud_agent"));
        assert!(!network.contains(&agent("fraud_agent")));
        assert!(matches!(handle.capability().await, Err(RuntimeError::ChannelClosed)));
    }

    #[tokio::test]
    async fn resource_query_across_agents() {
        let network = LocalNetwork::new();
        let (fraud, _fraud_join) = spawn_agent(engine("fraud_agent", 4.0), &network).unwrap();
        let (policy, _policy_join) = spawn_agent(engine("policy_agent", 10.0), &network).unwrap();

        let report = fraud.query_resources(policy.id()).await.unwrap();
        assert_eq!(report.agent_id, agent("policy_agent"));
        assert!((report.available_resources.get(&cpu()) - 10.0).abs() < 1e-9);

        let err = fraud.query_resources(&agent("ghost_agent")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::AgentUnavailable(_)));

        fraud.shutdown().await.unwrap();
        policy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_peer_aborts_session() {
        let network = LocalNetwork::new();
        let (fraud, _join) = spawn_agent(engine("fraud_agent", 4.0), &network).unwrap();

        let ticket = fraud
            .initiate(&agent("ghost_agent"), NegotiationType::ResourceAllocation, RequestDetails::default())
            .await
            .unwrap();
        let record = ticket.outcome().await.unwrap();

        assert_eq!(record.final_status, NegotiationStatus::Rejected);
        assert_eq!(record.reason, Some(RejectionReason::PeerUnreachable));
        fraud.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn raw_unknown_kind_is_dropped() {
        let network = LocalNetwork::new();
        let (fraud, _join) = spawn_agent(engine("fraud_agent", 4.0), &network).unwrap();

        let raw = r#"{"from":"policy_agent","to":"fraud_agent","message":{"kind":"heartbeat"}}"#;
        assert_eq!(fraud.deliver_raw(raw).await.unwrap(), None);

        let before = fraud.capability().await.unwrap();
        assert_eq!(before.trust(&agent("policy_agent")), Score::NEUTRAL);
        assert!(fraud.history().await.unwrap().is_empty());
        fraud.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn invite_round_trip() {
        let network = LocalNetwork::new();
        let (fraud, _fraud_join) = spawn_agent(engine("fraud_agent", 4.0), &network).unwrap();
        let (policy, _policy_join) = spawn_agent(engine("policy_agent", 4.0), &network).unwrap();

        let details = RequestDetails::new("joint_review")
            .requiring("fraud_detection")
            .needing(ResourceMap::new());
        let response = fraud.invite(policy.id(), details).await.unwrap();
        assert!(response.is_accept());

        fraud.shutdown().await.unwrap();
        policy.shutdown().await.unwrap();
    }
}
