// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Event handlers (§4.6): one [`bai_eventbus::EventHandler`] per row of the
//! event-handler table, driving the FSM, the agent cache, and the
//! resource-occupancy ledger from bus traffic.
//!
//! `SessionStarted`/`SessionCancelled` and `DoTerminateSession` call out
//! through small trait seams ([`CreationWaiter`], [`SessionDestroyer`])
//! rather than depending on the registry crate directly, since the
//! registry's `create_session`/`destroy_session` commands are themselves
//! built on top of this crate.

use std::sync::Arc;

use async_trait::async_trait;
use bai_core::{
    AccessKey, AgentId, AgentStatus, ClusterMode, ClusterRole, Clock, ConcurrencyKind, DomainName,
    Event, Kernel, KernelId, NetworkType, ProjectName, RegistryError, ResourceSlots, Session,
    SessionId, SessionType, Status, StatusData,
};
use bai_adapters::{AgentCache, RpcContextFactory};
use bai_eventbus::EventHandler;
use bai_storage::{
    repo::networks::NetworkKind, AgentRepo, EndpointRepo, KernelRepo, NetworkRepo, RedisCounters,
    RouteRepo, SessionRepo,
};
use bai_wire::DEFAULT_WRITE_TIMEOUT;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::from_storage;
use crate::fsm::{recompute_session_status, transition_kernel};
use crate::updatable_set::UpdatableSet;

/// Signals waiters blocked on a session reaching RUNNING or a terminal
/// status, implemented by the registry's `create_session` wait step (§9).
#[async_trait]
pub trait CreationWaiter: Send + Sync {
    async fn notify_started(&self, session_id: SessionId);
    async fn notify_cancelled(&self, session_id: SessionId, reason: String);
}

/// Invokes `destroy_session`-equivalent teardown, implemented by the
/// registry (§4.5 `destroy_session`).
#[async_trait]
pub trait SessionDestroyer: Send + Sync {
    async fn destroy(&self, session_id: SessionId, reason: String) -> Result<(), RegistryError>;
}

fn log_err(event_name: &str, err: impl std::fmt::Display) -> String {
    let msg = err.to_string();
    warn!(event = event_name, error = %msg, "event handler failed");
    msg
}

/// `KernelPreparing` (§4.6): log-only, no state mutation — PREPARING is a
/// transient hint, not a status this FSM tracks as a distinct step from
/// PULLING.
pub struct KernelPreparingHandler;

#[async_trait]
impl EventHandler for KernelPreparingHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            info!(summary = %event.log_summary(), "kernel preparing");
        }
        Ok(())
    }
}

/// `AgentError` (§9 supplemented feature 3): log-only. This is the event
/// the bus's failure observer publishes to surface agent-side exceptions;
/// nothing here mutates FSM state.
pub struct AgentErrorHandler;

#[async_trait]
impl EventHandler for AgentErrorHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            warn!(summary = %event.log_summary(), "agent error reported");
        }
        Ok(())
    }
}

/// `KernelPulling` (§4.6): transitions the kernel to PULLING and registers
/// its session for aggregation.
pub struct KernelPullingHandler<C: Clock> {
    pool: PgPool,
    clock: C,
    updatable: Arc<UpdatableSet>,
}

impl<C: Clock> KernelPullingHandler<C> {
    pub fn new(pool: PgPool, clock: C, updatable: Arc<UpdatableSet>) -> Self {
        Self { pool, clock, updatable }
    }
}

#[async_trait]
impl<C: Clock> EventHandler for KernelPullingHandler<C> {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::KernelPulling { kernel_id, session_id, .. } = event else { continue };
            let epoch_ms = self.clock.epoch_ms() as i64;
            let result: Result<(), RegistryError> = async {
                let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
                let kernel = KernelRepo::find_for_update(&mut tx, kernel_id)
                    .await
                    .map_err(from_storage)?
                    .ok_or_else(|| RegistryError::not_found(format!("kernel {kernel_id} not found")))?;
                let mut history = kernel.status_history.clone();
                transition_kernel(&mut tx, kernel_id, kernel.status, Status::Pulling, &mut history, epoch_ms).await?;
                tx.commit().await.map_err(|e| from_storage(e.into()))?;
                Ok(())
            }
            .await;
            result.map_err(|e| log_err(event.name(), e))?;
            self.updatable.register(*session_id);
        }
        Ok(())
    }
}

/// `KernelCreating` (§4.6): transitions the kernel to CREATING.
pub struct KernelCreatingHandler<C: Clock> {
    pool: PgPool,
    clock: C,
    updatable: Arc<UpdatableSet>,
}

impl<C: Clock> KernelCreatingHandler<C> {
    pub fn new(pool: PgPool, clock: C, updatable: Arc<UpdatableSet>) -> Self {
        Self { pool, clock, updatable }
    }
}

#[async_trait]
impl<C: Clock> EventHandler for KernelCreatingHandler<C> {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::KernelCreating { kernel_id, session_id } = event else { continue };
            let epoch_ms = self.clock.epoch_ms() as i64;
            let result: Result<(), RegistryError> = async {
                let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
                let kernel = KernelRepo::find_for_update(&mut tx, kernel_id)
                    .await
                    .map_err(from_storage)?
                    .ok_or_else(|| RegistryError::not_found(format!("kernel {kernel_id} not found")))?;
                let mut history = kernel.status_history.clone();
                transition_kernel(&mut tx, kernel_id, kernel.status, Status::Creating, &mut history, epoch_ms).await?;
                tx.commit().await.map_err(|e| from_storage(e.into()))?;
                Ok(())
            }
            .await;
            result.map_err(|e| log_err(event.name(), e))?;
            self.updatable.register(*session_id);
        }
        Ok(())
    }
}

/// `KernelStarted` (§4.6): persists actual allocated slots/ports/container
/// id and transitions to RUNNING in one write (scheduler's own
/// `apply_creation_results` covers the `create_kernels` response path;
/// this handler covers the same event arriving independently off the bus,
/// e.g. a `restart_kernel` reply).
pub struct KernelStartedHandler<C: Clock> {
    pool: PgPool,
    clock: C,
    updatable: Arc<UpdatableSet>,
}

impl<C: Clock> KernelStartedHandler<C> {
    pub fn new(pool: PgPool, clock: C, updatable: Arc<UpdatableSet>) -> Self {
        Self { pool, clock, updatable }
    }
}

#[async_trait]
impl<C: Clock> EventHandler for KernelStartedHandler<C> {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::KernelStarted {
                kernel_id,
                session_id,
                container_id,
                actual_allocated_slots,
                service_ports,
                ports,
            } = event
            else {
                continue;
            };
            let epoch_ms = self.clock.epoch_ms() as i64;
            let result: Result<(), RegistryError> = async {
                let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
                let kernel = KernelRepo::find_for_update(&mut tx, kernel_id)
                    .await
                    .map_err(from_storage)?
                    .ok_or_else(|| RegistryError::not_found(format!("kernel {kernel_id} not found")))?;
                let mut history = kernel.status_history.clone();
                bai_core::record_transition(&mut history, Status::Running, epoch_ms);
                KernelRepo::mark_started(
                    &mut tx,
                    kernel_id,
                    actual_allocated_slots,
                    ports,
                    service_ports,
                    container_id,
                    &history,
                )
                .await
                .map_err(from_storage)?;
                tx.commit().await.map_err(|e| from_storage(e.into()))?;
                Ok(())
            }
            .await;
            result.map_err(|e| log_err(event.name(), e))?;
            self.updatable.register(*session_id);
        }
        Ok(())
    }
}

/// `KernelCancelled` (§4.6): log-only. Aggregation picks up the new status
/// from whichever handler actually performed the transition.
pub struct KernelCancelledHandler;

#[async_trait]
impl EventHandler for KernelCancelledHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            info!(summary = %event.log_summary(), "kernel cancelled");
        }
        Ok(())
    }
}

/// `KernelTerminating` (§4.6): log-only, no DB mutation (`destroy_kernel`
/// already moved the kernel to TERMINATING before publishing this).
pub struct KernelTerminatingHandler;

#[async_trait]
impl EventHandler for KernelTerminatingHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            info!(summary = %event.log_summary(), "kernel terminating");
        }
        Ok(())
    }
}

/// `KernelTerminated` (§4.6): transitions the kernel to TERMINATED,
/// releases its occupied slots from the owning agent, and decrements the
/// keypair's compute-concurrency counter.
pub struct KernelTerminatedHandler<C: Clock> {
    pool: PgPool,
    clock: C,
    counters: RedisCounters,
    updatable: Arc<UpdatableSet>,
}

impl<C: Clock> KernelTerminatedHandler<C> {
    pub fn new(pool: PgPool, clock: C, counters: RedisCounters, updatable: Arc<UpdatableSet>) -> Self {
        Self { pool, clock, counters, updatable }
    }
}

#[async_trait]
impl<C: Clock> EventHandler for KernelTerminatedHandler<C> {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::KernelTerminated { kernel_id, session_id, reason, exit_code } = event else {
                continue;
            };
            let epoch_ms = self.clock.epoch_ms() as i64;
            let access_key: Option<String> = {
                let result: Result<Option<String>, RegistryError> = async {
                    let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
                    let kernel = KernelRepo::find_for_update(&mut tx, kernel_id)
                        .await
                        .map_err(from_storage)?
                        .ok_or_else(|| RegistryError::not_found(format!("kernel {kernel_id} not found")))?;
                    let mut history = kernel.status_history.clone();
                    transition_kernel(&mut tx, kernel_id, kernel.status, Status::Terminated, &mut history, epoch_ms)
                        .await?;
                    if let Some(code) = exit_code {
                        KernelRepo::set_exit_code(&mut tx, kernel_id, *code).await.map_err(from_storage)?;
                    }
                    let access_key = if let Some(agent_id) = &kernel.agent_id {
                        if let Some(agent) = AgentRepo::find_for_update(&mut tx, agent_id).await.map_err(from_storage)? {
                            let released = &agent.occupied_slots - &kernel.occupied_slots;
                            AgentRepo::set_occupied_slots(&mut tx, agent_id, &released).await.map_err(from_storage)?;
                        }
                        let session = SessionRepo::find_for_update(&mut tx, session_id)
                            .await
                            .map_err(from_storage)?
                            .map(|s| s.access_key.0);
                        session
                    } else {
                        None
                    };
                    tx.commit().await.map_err(|e| from_storage(e.into()))?;
                    Ok(access_key)
                }
                .await;
                result.map_err(|e| log_err(event.name(), e))?
            };

            if let Some(access_key) = access_key {
                if let Err(e) = self.counters.decr_concurrency(&access_key, ConcurrencyKind::Compute).await {
                    warn!(kernel_id = %kernel_id, error = %e, "failed to decrement keypair concurrency");
                }
            }
            info!(kernel_id = %kernel_id, reason = %reason, "kernel terminated");
            self.updatable.register(*session_id);
        }
        Ok(())
    }
}

/// The body POSTed to a session's `callback_url` on `SessionStarted`/
/// `SessionCancelled` (§4.6).
#[derive(serde::Serialize)]
struct CallbackPayload {
    session_id: SessionId,
    session_name: String,
    status: String,
    reason: Option<String>,
}

const CALLBACK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// `SessionStarted` / `SessionCancelled` (§4.6): signal whatever is
/// blocked in `create_session`'s wait-for-completion step, and POST the
/// session's callback url if it set one.
pub struct SessionLifecycleHandler<W: CreationWaiter> {
    sessions: SessionRepo,
    waiter: Arc<W>,
    http: reqwest::Client,
}

impl<W: CreationWaiter> SessionLifecycleHandler<W> {
    pub fn new(sessions: SessionRepo, waiter: Arc<W>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { sessions, waiter, http }
    }
}

#[async_trait]
impl<W: CreationWaiter> EventHandler for SessionLifecycleHandler<W> {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            match event {
                Event::SessionStarted { session_id, .. } => {
                    self.waiter.notify_started(*session_id).await;
                    self.maybe_callback(*session_id, None).await;
                }
                Event::SessionCancelled { session_id, reason, .. } => {
                    self.waiter.notify_cancelled(*session_id, reason.clone()).await;
                    self.maybe_callback(*session_id, Some(reason.clone())).await;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl<W: CreationWaiter> SessionLifecycleHandler<W> {
    /// POSTs the session's lifecycle status to its `callback_url` if one is
    /// set (§4.6: "POST callback url if set"). A failed delivery is logged
    /// and dropped — like every other event handler, this is never retried
    /// by the core itself (§7 "events are never retried").
    async fn maybe_callback(&self, session_id: SessionId, reason: Option<String>) {
        let session = match self.sessions.find_by_id(&session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to load session for callback check");
                return;
            }
        };
        let Some(url) = session.callback_url else { return };
        let payload = CallbackPayload {
            session_id,
            session_name: session.name,
            status: session.status.to_string(),
            reason,
        };
        match self.http.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(session_id = %session_id, url = %url, "delivered session lifecycle callback");
            }
            Ok(resp) => {
                warn!(session_id = %session_id, url = %url, status = %resp.status(), "callback endpoint rejected delivery");
            }
            Err(e) => warn!(session_id = %session_id, url = %url, error = %e, "failed to deliver session lifecycle callback"),
        }
    }
}

/// `SessionTerminated` (§4.6): tears down the session's network — deletes
/// a local network's row directly, or calls `destroy_local_network` on the
/// home agent first for an overlay network homed on one.
pub struct SessionTerminatedHandler {
    pool: PgPool,
    networks: NetworkRepo,
    rpc: RpcContextFactory,
}

impl SessionTerminatedHandler {
    pub fn new(pool: PgPool, networks: NetworkRepo, rpc: RpcContextFactory) -> Self {
        Self { pool, networks, rpc }
    }
}

#[async_trait]
impl EventHandler for SessionTerminatedHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::SessionTerminated { session_id, reason } = event else { continue };
            let network_id = format!("net-{session_id}");
            let row = match self.networks.find(&network_id).await {
                Ok(row) => row,
                Err(e) => return Err(log_err(event.name(), e)),
            };
            let Some((kind, agent_id)) = row else { continue };

            if let (NetworkKind::Local, Some(agent_id)) = (kind, &agent_id) {
                if let Ok(ctx) = self.rpc.rpc_context(*agent_id, None, DEFAULT_WRITE_TIMEOUT) {
                    if let Err(e) = ctx.invoke(ctx.transport().destroy_local_network(agent_id, &network_id)).await {
                        warn!(session_id = %session_id, error = %e, "failed to destroy local network");
                    }
                }
            }

            let result: Result<(), RegistryError> = async {
                let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
                NetworkRepo::delete(&mut tx, &network_id).await.map_err(from_storage)?;
                tx.commit().await.map_err(|e| from_storage(e.into()))?;
                Ok(())
            }
            .await;
            result.map_err(|e| log_err(event.name(), e))?;
            info!(session_id = %session_id, reason = %reason, "session network torn down");
        }
        Ok(())
    }
}

/// `DoTerminateSession` (§4.6): invokes `destroy_session` on behalf of a
/// bus-triggered termination (e.g. idle timeout, admin force-kill), rather
/// than a direct command-surface call.
pub struct DoTerminateSessionHandler<D: SessionDestroyer> {
    destroyer: Arc<D>,
}

impl<D: SessionDestroyer> DoTerminateSessionHandler<D> {
    pub fn new(destroyer: Arc<D>) -> Self {
        Self { destroyer }
    }
}

#[async_trait]
impl<D: SessionDestroyer> EventHandler for DoTerminateSessionHandler<D> {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::DoTerminateSession { session_id, reason } = event else { continue };
            self.destroyer
                .destroy(*session_id, reason.clone())
                .await
                .map_err(|e| log_err(event.name(), e))?;
        }
        Ok(())
    }
}

/// `AgentStarted` (§4.6): marks the agent ALIVE and refreshes the agent
/// cache so `rpc_context` can route to it.
pub struct AgentStartedHandler {
    pool: PgPool,
    cache: AgentCache,
}

impl AgentStartedHandler {
    pub fn new(pool: PgPool, cache: AgentCache) -> Self {
        Self { pool, cache }
    }
}

#[async_trait]
impl EventHandler for AgentStartedHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::AgentStarted { agent_id, reason } = event else { continue };
            let result: Result<(), RegistryError> = async {
                let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
                if let Some(mut agent) = AgentRepo::find_for_update(&mut tx, agent_id).await.map_err(from_storage)? {
                    agent.status = AgentStatus::Alive;
                    agent.lost_at_epoch_ms = None;
                    AgentRepo::update(&mut tx, &agent).await.map_err(from_storage)?;
                    self.cache.update(*agent_id, agent.address.clone(), agent.public_key.clone());
                }
                tx.commit().await.map_err(|e| from_storage(e.into()))?;
                Ok(())
            }
            .await;
            result.map_err(|e| log_err(event.name(), e))?;
            info!(agent_id = %agent_id, reason = %reason, "agent started");
        }
        Ok(())
    }
}

/// `AgentTerminated` (§4.6): LOST on `agent-lost`, RESTARTING on
/// `agent-restart`, TERMINATED otherwise; always invalidates the cache
/// entry and the image reverse index.
pub struct AgentTerminatedHandler {
    pool: PgPool,
    cache: AgentCache,
    counters: RedisCounters,
}

impl AgentTerminatedHandler {
    pub fn new(pool: PgPool, cache: AgentCache, counters: RedisCounters) -> Self {
        Self { pool, cache, counters }
    }
}

#[async_trait]
impl EventHandler for AgentTerminatedHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::AgentTerminated { agent_id, reason } = event else { continue };
            let status = match reason.as_str() {
                "agent-lost" => AgentStatus::Lost,
                "agent-restart" => AgentStatus::Restarting,
                _ => AgentStatus::Terminated,
            };
            let result: Result<(), RegistryError> = async {
                let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
                if let Some(mut agent) = AgentRepo::find_for_update(&mut tx, agent_id).await.map_err(from_storage)? {
                    agent.status = status;
                    AgentRepo::update(&mut tx, &agent).await.map_err(from_storage)?;
                }
                tx.commit().await.map_err(|e| from_storage(e.into()))?;
                Ok(())
            }
            .await;
            result.map_err(|e| log_err(event.name(), e))?;

            self.cache.invalidate(agent_id);
            if let Err(e) = self.counters.remove_agent_from_all_images(agent_id).await {
                warn!(agent_id = %agent_id, error = %e, "failed to clear image reverse index");
            }
            info!(agent_id = %agent_id, reason = %reason, status = %status, "agent terminated");
        }
        Ok(())
    }
}

/// `RouteCreated` (§4.6): builds and enqueues a PENDING session for the
/// endpoint's route. `bai-registry`'s `create_session` command is the
/// full multi-step path (§4.5); this inlines just enough of it — a
/// single-kernel session matching the endpoint's image and resource
/// slots — since the registry crate is layered above this one.
pub struct RouteCreatedHandler<C: Clock> {
    pool: PgPool,
    endpoints: EndpointRepo,
    clock: C,
}

impl<C: Clock> RouteCreatedHandler<C> {
    pub fn new(pool: PgPool, endpoints: EndpointRepo, clock: C) -> Self {
        Self { pool, endpoints, clock }
    }
}

#[async_trait]
impl<C: Clock> EventHandler for RouteCreatedHandler<C> {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::RouteCreated { route_id, endpoint_id } = event else { continue };
            let result = self.provision(*route_id, *endpoint_id).await;
            if let Err(e) = result {
                let msg = log_err(event.name(), &e);
                let mut tx = match self.pool.begin().await {
                    Ok(tx) => tx,
                    Err(_) => return Err(msg),
                };
                EndpointRepo::increment_retries(&mut tx, endpoint_id).await.ok();
                RouteRepo::set_status(&mut tx, route_id, bai_core::RouteStatus::FailedToStart).await.ok();
                tx.commit().await.ok();
                return Err(msg);
            }
        }
        Ok(())
    }
}

impl<C: Clock> RouteCreatedHandler<C> {
    async fn provision(
        &self,
        route_id: bai_core::RouteId,
        endpoint_id: bai_core::EndpointId,
    ) -> Result<(), RegistryError> {
        let endpoint = self
            .endpoints
            .find_by_id(&endpoint_id)
            .await
            .map_err(from_storage)?
            .ok_or_else(|| RegistryError::not_found(format!("endpoint {endpoint_id} not found")))?;

        let session_id = SessionId::new();
        let kernel_id = KernelId::new();
        let epoch_ms = self.clock.epoch_ms() as i64;

        let mut session = Session {
            id: session_id,
            name: format!("route-{route_id}"),
            access_key: AccessKey(String::new()),
            domain: DomainName(String::new()),
            project: ProjectName(String::new()),
            scaling_group: None,
            session_type: SessionType::Inference,
            cluster_mode: ClusterMode::SingleNode,
            cluster_size: 1,
            priority: 0,
            status: Status::Pending,
            status_history: Default::default(),
            images: vec![endpoint.image.clone()],
            vfolder_mounts: Vec::new(),
            environ: Default::default(),
            requested_slots: endpoint.resource_slots.clone(),
            occupied_slots: ResourceSlots::new(),
            starts_at_epoch_ms: None,
            batch_timeout_secs: None,
            callback_url: None,
            network_type: NetworkType::Volatile,
            network_id: None,
            creation_id: None,
        };
        bai_core::record_transition(&mut session.status_history, Status::Pending, epoch_ms);

        let mut kernel = Kernel {
            id: kernel_id,
            session_id,
            cluster_role: ClusterRole::Main,
            cluster_idx: 0,
            agent_id: None,
            image: endpoint.image,
            requested_slots: endpoint.resource_slots,
            occupied_slots: ResourceSlots::new(),
            status: Status::Pending,
            status_history: Default::default(),
            exit_code: None,
            service_ports: Vec::new(),
            container_id: None,
            ports: Default::default(),
            startup_command: None,
            bootstrap_script: None,
            status_info: None,
            status_data: None,
        };
        bai_core::record_transition(&mut kernel.status_history, Status::Pending, epoch_ms);

        let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
        SessionRepo::insert(&mut tx, &session).await.map_err(from_storage)?;
        KernelRepo::insert(&mut tx, &kernel).await.map_err(from_storage)?;
        RouteRepo::bind_session(&mut tx, &route_id, &session_id).await.map_err(from_storage)?;
        tx.commit().await.map_err(|e| from_storage(e.into()))?;
        Ok(())
    }
}

/// `DoSyncKernelLogs` (§4.6): drains up to a fixed chunk count from the
/// container's Redis log list, concatenates, persists, and deletes the
/// list (mirrors the source's periodic log-sync background task).
const MAX_LOG_CHUNKS_PER_SYNC: isize = 1000;

pub struct DoSyncKernelLogsHandler {
    kernels: KernelRepo,
    counters: RedisCounters,
}

impl DoSyncKernelLogsHandler {
    pub fn new(kernels: KernelRepo, counters: RedisCounters) -> Self {
        Self { kernels, counters }
    }
}

#[async_trait]
impl EventHandler for DoSyncKernelLogsHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::DoSyncKernelLogs { kernel_id, container_id } = event else { continue };
            let chunks = self
                .counters
                .drain_log_chunks(container_id, MAX_LOG_CHUNKS_PER_SYNC)
                .await
                .map_err(|e| log_err(event.name(), e))?;
            if chunks.is_empty() {
                continue;
            }
            let joined = chunks.concat();
            self.kernels.append_log(kernel_id, &joined).await.map_err(|e| log_err(event.name(), e))?;
        }
        Ok(())
    }
}

/// `ImagePullStarted`/`ImagePullFinished`/`ImagePullFailed` (§4.6): bulk
/// transition every kernel of the `(agent, image)` pair that's still
/// waiting on the pull, and register the affected sessions for
/// aggregation.
pub struct ImagePullHandler<C: Clock> {
    pool: PgPool,
    kernels: KernelRepo,
    clock: C,
    updatable: Arc<UpdatableSet>,
}

impl<C: Clock> ImagePullHandler<C> {
    pub fn new(pool: PgPool, kernels: KernelRepo, clock: C, updatable: Arc<UpdatableSet>) -> Self {
        Self { pool, kernels, clock, updatable }
    }

    async fn bulk_transition(
        &self,
        agent_id: &AgentId,
        image: &str,
        from: &[Status],
        to: Status,
        detail: Option<(&str, StatusData)>,
    ) -> Result<(), RegistryError> {
        let epoch_ms = self.clock.epoch_ms() as i64;
        let mut candidates = Vec::new();
        for status in from {
            candidates.extend(self.kernels.list_by_agent_status(agent_id, *status).await.map_err(from_storage)?);
        }
        let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
        for kernel in candidates.iter().filter(|k| k.image.canonical == image) {
            let mut history = kernel.status_history.clone();
            transition_kernel(&mut tx, &kernel.id, kernel.status, to, &mut history, epoch_ms).await?;
            if let Some((status_info, ref status_data)) = detail {
                KernelRepo::set_status_detail(&mut tx, &kernel.id, Some(status_info), Some(status_data.clone()))
                    .await
                    .map_err(from_storage)?;
            }
        }
        tx.commit().await.map_err(|e| from_storage(e.into()))?;
        for kernel in candidates.iter().filter(|k| k.image.canonical == image) {
            self.updatable.register(kernel.session_id);
        }
        Ok(())
    }
}

#[async_trait]
impl<C: Clock> EventHandler for ImagePullHandler<C> {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let result = match event {
                Event::ImagePullStarted { agent_id, image, .. } => {
                    self.bulk_transition(agent_id, image, &[Status::Scheduled], Status::Pulling, None).await
                }
                Event::ImagePullFinished { agent_id, image, .. } => {
                    self.bulk_transition(agent_id, image, &[Status::Pulling], Status::Prepared, None).await
                }
                Event::ImagePullFailed { agent_id, image, msg, .. } => {
                    // The original selects kernels IN (SCHEDULED, PULLING) for
                    // this transition and persists the failure message as
                    // status_data.error.repr (§8 scenario 2).
                    self.bulk_transition(
                        agent_id,
                        image,
                        &[Status::Scheduled, Status::Pulling],
                        Status::Cancelled,
                        Some(("image-pull-failed", StatusData::error_repr(msg.clone()))),
                    )
                    .await
                }
                _ => continue,
            };
            result.map_err(|e| log_err(event.name(), e))?;
        }
        Ok(())
    }
}

/// Drains the updatable set and recomputes each affected session's status
/// exactly once per drain (§4.3 "drained once per event batch"). Meant to
/// be called by the daemon on a short fixed interval, not per individual
/// event, so a burst of kernel transitions collapses into one aggregation
/// pass per session. Returns the session lifecycle events produced, for
/// the caller to publish back onto the bus.
pub async fn drain_and_recompute<C: Clock>(
    pool: &PgPool,
    updatable: &UpdatableSet,
    sessions: &SessionRepo,
    clock: &C,
) -> Result<Vec<Event>, RegistryError> {
    let epoch_ms = clock.epoch_ms() as i64;
    let mut produced = Vec::new();
    for session_id in updatable.drain() {
        let Some(session) = sessions.find_by_id(&session_id).await.map_err(from_storage)? else { continue };
        let mut history = session.status_history.clone();
        let mut tx = pool.begin().await.map_err(|e| from_storage(e.into()))?;
        let event = recompute_session_status(
            &mut tx,
            session_id,
            session.status,
            session.creation_id.as_deref().unwrap_or(""),
            &mut history,
            epoch_ms,
        )
        .await?;
        tx.commit().await.map_err(|e| from_storage(e.into()))?;
        if let Some(event) = event {
            produced.push(event);
        }
    }
    Ok(produced)
}
