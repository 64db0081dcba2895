// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The registry command surface (§4.5): `create_session`, `destroy_session`,
//! `restart_session`, the thin per-kernel RPC wrappers, `commit_session`,
//! `handle_heartbeat`, and `recalc_resource_usage`.
//!
//! Grounded on `bai_engine::handlers::RouteCreatedHandler::provision` for
//! the session+kernel construction/persistence shape and on
//! `KernelTerminatedHandler` for the occupied-slots-release and
//! concurrency-decrement pattern.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bai_core::{
    record_transition, Agent, AgentFailure, AgentId, AgentStatus, ClusterMode, ClusterRole, Clock,
    ConcurrencyKind, Event, ImageRef, Kernel, KernelId, OwnerScope, RegistryError, ResourceSlots,
    Session, SessionDependency, SessionId, SessionType, Status, VFolderMount,
};
use bai_engine::{from_rpc, from_storage};
use bai_storage::{
    AgentRepo, KernelRepo, SessionDependencyRepo, SessionRepo, VFolderRepo,
};
use bai_wire::{ClusterRoleAssignment, ExecutionResult, ImageConfig, KernelCreationConfig};

use crate::event_publisher::EventPublisher;
use crate::registry::Registry;
use crate::validation;
use crate::waiter::CreationOutcome;

/// Slot names this registry knows about (§4.5 step 2 validation). The
/// storage layer's resource policies/images carry the authoritative slot
/// vocabulary; this is the fixed set the scheduler and images are grounded
/// against elsewhere in this pack.
const KNOWN_RESOURCE_SLOTS: &[&str] =
    &["cpu", "mem", "shmem", "cuda.device", "cuda.shares", "rocm.device", "tpu.device"];

/// Mount paths a session's own layout reserves; an alias may not shadow one
/// of these (§4.5 step 1).
const RESERVED_MOUNT_PATHS: &[&str] = &["/home/work", "/home/config", "/home/.cache"];

/// Everything `create_session` needs from its caller (§4.5).
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub name: String,
    pub owner: OwnerScope,
    pub session_type: SessionType,
    pub cluster_mode: ClusterMode,
    pub cluster_size: u32,
    pub priority: i32,
    pub image: ImageRef,
    pub requested_slots: ResourceSlots,
    pub environ: BTreeMap<String, String>,
    pub vfolder_mounts: Vec<VFolderMount>,
    pub startup_command: Option<String>,
    pub bootstrap_script: Option<String>,
    pub starts_at_epoch_ms: Option<i64>,
    pub batch_timeout_secs: Option<u64>,
    pub callback_url: Option<String>,
    pub network_type: bai_core::NetworkType,
    pub depends_on: Vec<SessionId>,
    /// Whether a live session of the same name/owner should be returned
    /// instead of rejected (§4.5 step 4 reuse check).
    pub reuse: bool,
    /// Skip the wait-for-completion step and return as soon as the
    /// session is enqueued (§4.5 step 8).
    pub enqueue_only: bool,
    pub max_wait_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateSessionOutcome {
    /// Step 4 reuse check matched a live session with the same image.
    Reused { session_id: SessionId },
    EnqueuedOnly { session_id: SessionId },
    Started { session_id: SessionId },
    Cancelled { session_id: SessionId, reason: String },
    /// `max_wait_seconds` elapsed; the session is still enqueued (§4.5 step
    /// 8: the timeout doesn't cancel the enqueue).
    Timeout { session_id: SessionId },
}

/// §3 `ConcurrencyKind`: system-type sessions (inference/admin) decrement
/// the system counter, everything else decrements the compute counter.
fn concurrency_kind_for_session(session_type: SessionType) -> ConcurrencyKind {
    match session_type {
        SessionType::System => ConcurrencyKind::System,
        SessionType::Interactive | SessionType::Batch | SessionType::Inference => ConcurrencyKind::Compute,
    }
}

impl<C: Clock, P: EventPublisher> Registry<C, P> {
    /// §4.5 `create_session`: the 8-step validate/resolve/enqueue pipeline.
    pub async fn create_session(&self, req: CreateSessionRequest) -> Result<CreateSessionOutcome, RegistryError> {
        // Step 1: alias-folder validation.
        validation::validate_alias_mounts(&req.vfolder_mounts, RESERVED_MOUNT_PATHS)?;
        // Step 2: resource-slot-name validation.
        validation::validate_slot_names(&req.requested_slots, KNOWN_RESOURCE_SLOTS)?;

        // Step 3: image resolution.
        let image = self
            .images
            .find_by_canonical_and_arch(&req.image.canonical, &req.image.architecture)
            .await
            .map_err(from_storage)?
            .ok_or_else(|| RegistryError::not_found(format!("image {} not found", req.image.canonical)))?;
        if !self.images.domain_allows_registry(&req.owner.domain.0, &image.registry).await.map_err(from_storage)? {
            return Err(RegistryError::invalid_argument(format!(
                "registry {} is not allowed for domain {}",
                image.registry, req.owner.domain
            )));
        }
        if let Some(owner_label) = image.owner_label() {
            if owner_label != req.owner.access_key.0 {
                return Err(RegistryError::invalid_argument("image is customized for a different owner"));
            }
        }

        // Step 4: reuse check.
        if let Some(existing) = self
            .sessions
            .find_live_by_name_and_access_key(&req.name, &req.owner.access_key)
            .await
            .map_err(from_storage)?
        {
            let same_image = existing
                .main_image()
                .map(|m| m.canonical == image.canonical && m.architecture == image.architecture)
                .unwrap_or(false);
            if req.reuse && same_image {
                return Ok(CreateSessionOutcome::Reused { session_id: existing.id });
            }
            return Err(RegistryError::invalid_argument(format!("session {} already exists", req.name)));
        }

        // Step 5: batch field validation.
        validation::validate_batch_fields(
            req.session_type,
            req.startup_command.as_deref(),
            req.starts_at_epoch_ms,
            req.batch_timeout_secs,
        )?;
        validation::validate_priority(req.priority, self.config.priority_range)?;
        validation::validate_image_slot_range(&image, &req.requested_slots)?;
        validation::validate_shared_memory(&req.requested_slots, self.config.default_shared_memory_bytes)?;

        if let Some(policy) = self.owners.keypair_resource_policy(&req.owner.access_key.0).await.map_err(from_storage)? {
            validation::validate_cluster_size_quota(req.cluster_size, policy.max_containers_per_session)?;
        }

        let session_id = SessionId::new();
        let creation_id = nanoid::nanoid!();

        // Dependency edges: check existence and acyclicity before opening
        // the write transaction (plain reads, same non-tx-read-then-tx-write
        // shape the scheduler uses for quota checks).
        let mut known_deps = self.dependencies.list_for_owner(&req.owner.access_key.0).await.map_err(from_storage)?;
        let mut new_deps = Vec::with_capacity(req.depends_on.len());
        for depends_on in &req.depends_on {
            if !self.dependencies.exists(depends_on).await.map_err(from_storage)? {
                return Err(RegistryError::not_found(format!("dependency session {depends_on} not found")));
            }
            if bai_core::would_cycle(&known_deps, session_id, *depends_on) {
                return Err(RegistryError::invalid_argument(format!(
                    "dependency on {depends_on} would create a cycle"
                )));
            }
            let edge = SessionDependency { session_id, depends_on: *depends_on };
            known_deps.push(SessionDependency { session_id: edge.session_id, depends_on: edge.depends_on });
            new_deps.push(edge);
        }

        // Step 6: enqueue_session — persist the PENDING session and its
        // kernels in one transaction.
        let epoch_ms = self.epoch_ms();
        let mut session = Session {
            id: session_id,
            name: req.name.clone(),
            access_key: req.owner.access_key.clone(),
            domain: req.owner.domain.clone(),
            project: req.owner.project.clone(),
            scaling_group: None,
            session_type: req.session_type,
            cluster_mode: req.cluster_mode,
            cluster_size: req.cluster_size,
            priority: req.priority,
            status: Status::Pending,
            status_history: Default::default(),
            images: vec![ImageRef::new(image.canonical.clone(), image.architecture.clone())],
            vfolder_mounts: req.vfolder_mounts.clone(),
            environ: req.environ.clone(),
            requested_slots: req.requested_slots.clone(),
            occupied_slots: ResourceSlots::new(),
            starts_at_epoch_ms: req.starts_at_epoch_ms,
            batch_timeout_secs: req.batch_timeout_secs,
            callback_url: req.callback_url.clone(),
            network_type: req.network_type,
            network_id: None,
            creation_id: Some(creation_id.clone()),
        };
        record_transition(&mut session.status_history, Status::Pending, epoch_ms);

        let mut kernels = Vec::with_capacity(req.cluster_size as usize);
        for idx in 0..req.cluster_size {
            let mut kernel = Kernel {
                id: KernelId::new(),
                session_id,
                cluster_role: if idx == 0 { ClusterRole::Main } else { ClusterRole::Sub },
                cluster_idx: idx,
                agent_id: None,
                image: ImageRef::new(image.canonical.clone(), image.architecture.clone()),
                requested_slots: req.requested_slots.clone(),
                occupied_slots: ResourceSlots::new(),
                status: Status::Pending,
                status_history: Default::default(),
                exit_code: None,
                service_ports: Vec::new(),
                container_id: None,
                ports: Default::default(),
                startup_command: req.startup_command.clone(),
                bootstrap_script: req.bootstrap_script.clone(),
                status_info: None,
                status_data: None,
            };
            record_transition(&mut kernel.status_history, Status::Pending, epoch_ms);
            kernels.push(kernel);
        }

        bai_storage::with_retry(&self.pool, self.config.tx_max_attempts, self.config.tx_base_delay, |tx| {
            let session = &session;
            let kernels = &kernels;
            let mounts = &req.vfolder_mounts;
            let new_deps = &new_deps;
            Box::pin(async move {
                SessionRepo::insert(tx, session).await?;
                for kernel in kernels.iter() {
                    KernelRepo::insert(tx, kernel).await?;
                }
                for mount in mounts.iter() {
                    VFolderRepo::insert_mount(tx, &session.id, mount).await?;
                }
                for dependency in new_deps.iter() {
                    SessionDependencyRepo::insert(tx, dependency).await?;
                }
                Ok(())
            })
        })
        .await
        .map_err(from_storage)?;

        self.counters
            .incr_concurrency(&req.owner.access_key.0, concurrency_kind_for_session(req.session_type))
            .await
            .map_err(from_storage)?;

        // Step 7/8: register before publishing so a notification that races
        // ahead of the wait below is never lost, then emit the event.
        self.waiters.register(session_id);
        self.publisher
            .publish(Event::SessionEnqueued { session_id, creation_id: creation_id.clone() }, "registry")
            .await?;

        if req.enqueue_only {
            return Ok(CreateSessionOutcome::EnqueuedOnly { session_id });
        }

        match self.waiters.wait(session_id, Duration::from_secs(req.max_wait_seconds)).await {
            CreationOutcome::Started => Ok(CreateSessionOutcome::Started { session_id }),
            CreationOutcome::Cancelled { reason } => Ok(CreateSessionOutcome::Cancelled { session_id, reason }),
            CreationOutcome::Timeout => Ok(CreateSessionOutcome::Timeout { session_id }),
        }
    }

    /// §4.5 `destroy_session`: the per-status branch logic, including the
    /// super-admin force path that bypasses the legal-transition table the
    /// same deliberate way `scheduler::force_failed_start` does.
    pub async fn destroy_session(
        &self,
        session_id: SessionId,
        forced: bool,
        reason: String,
        caller_is_super_admin: bool,
    ) -> Result<(), RegistryError> {
        let epoch_ms = self.epoch_ms();
        let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
        let session = SessionRepo::find_for_update(&mut tx, &session_id)
            .await
            .map_err(from_storage)?
            .ok_or_else(|| RegistryError::not_found(format!("session {session_id} not found")))?;

        match session.status {
            Status::Terminated | Status::Cancelled => {
                tx.rollback().await.map_err(|e| from_storage(e.into()))?;
                Err(RegistryError::invalid_argument(format!(
                    "session {session_id} is already {} and cannot be destroyed again",
                    session.status
                )))
            }
            Status::Pending => {
                let kernels = KernelRepo::list_for_update_by_session(&mut tx, &session_id).await.map_err(from_storage)?;
                for kernel in &kernels {
                    let mut history = kernel.status_history.clone();
                    bai_engine::fsm::transition_kernel(
                        &mut tx,
                        &kernel.id,
                        kernel.status,
                        Status::Cancelled,
                        &mut history,
                        epoch_ms,
                    )
                    .await?;
                }
                let mut history = session.status_history.clone();
                let event = bai_engine::fsm::recompute_session_status(
                    &mut tx,
                    session_id,
                    session.status,
                    session.creation_id.as_deref().unwrap_or(""),
                    &mut history,
                    epoch_ms,
                )
                .await?;
                tx.commit().await.map_err(|e| from_storage(e.into()))?;

                self.counters
                    .decr_concurrency(&session.access_key.0, concurrency_kind_for_session(session.session_type))
                    .await
                    .map_err(from_storage)?;
                if let Some(event) = event {
                    self.publisher.publish(event, "registry").await?;
                }
                Ok(())
            }
            Status::Running => {
                let kernels = KernelRepo::list_for_update_by_session(&mut tx, &session_id).await.map_err(from_storage)?;
                for kernel in &kernels {
                    let mut history = kernel.status_history.clone();
                    bai_engine::fsm::transition_kernel(
                        &mut tx,
                        &kernel.id,
                        kernel.status,
                        Status::Terminating,
                        &mut history,
                        epoch_ms,
                    )
                    .await?;
                }
                let mut history = session.status_history.clone();
                let event = bai_engine::fsm::recompute_session_status(
                    &mut tx,
                    session_id,
                    session.status,
                    session.creation_id.as_deref().unwrap_or(""),
                    &mut history,
                    epoch_ms,
                )
                .await?;
                tx.commit().await.map_err(|e| from_storage(e.into()))?;

                // Compute-kind concurrency is decremented later, per kernel,
                // by `KernelTerminatedHandler` once the agent confirms the
                // kernel actually terminated. System-kind sessions have no
                // such handler path, so this is the only place it happens.
                if session.session_type == SessionType::System {
                    self.counters.decr_concurrency(&session.access_key.0, ConcurrencyKind::System).await.map_err(from_storage)?;
                }
                if let Some(event) = event {
                    self.publisher.publish(event, "registry").await?;
                }

                let mut by_agent: HashMap<AgentId, Vec<&Kernel>> = HashMap::new();
                for kernel in kernels.iter().filter_map(|k| k.agent_id.map(|a| (a, k))) {
                    by_agent.entry(kernel.0).or_default().push(kernel.1);
                }

                let mut failures = Vec::new();
                for (agent_id, agent_kernels) in by_agent {
                    let ctx = match self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_write_timeout) {
                        Ok(ctx) => ctx,
                        Err(e) => {
                            failures.push(AgentFailure { agent_id: agent_id.to_string(), error: e.to_string() });
                            continue;
                        }
                    };
                    for kernel in agent_kernels {
                        let result = ctx
                            .invoke(ctx.transport().destroy_kernel(&agent_id, kernel.id, session_id, &reason, false))
                            .await;
                        if let Err(e) = result {
                            failures.push(AgentFailure { agent_id: agent_id.to_string(), error: e.to_string() });
                        }
                    }
                }
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(RegistryError::MultiAgentError(failures))
                }
            }
            other => {
                if !forced {
                    tx.rollback().await.map_err(|e| from_storage(e.into()))?;
                    return Err(RegistryError::invalid_argument(format!(
                        "session in status {other} cannot be destroyed without forced=true"
                    )));
                }
                if !caller_is_super_admin {
                    // Forced, but the caller lacks the authority for a direct
                    // hard-terminate: request a graceful teardown instead of
                    // rejecting outright (§4.5 `destroy_session`).
                    let kernels = KernelRepo::list_for_update_by_session(&mut tx, &session_id).await.map_err(from_storage)?;
                    for kernel in &kernels {
                        if matches!(kernel.status, Status::Terminating | Status::Terminated | Status::Cancelled) {
                            continue;
                        }
                        let mut history = kernel.status_history.clone();
                        record_transition(&mut history, Status::Terminating, epoch_ms);
                        KernelRepo::update_status(&mut tx, &kernel.id, Status::Terminating, &history)
                            .await
                            .map_err(from_storage)?;
                    }
                    let mut history = session.status_history.clone();
                    record_transition(&mut history, Status::Terminating, epoch_ms);
                    SessionRepo::update_status(&mut tx, &session_id, Status::Terminating, &history)
                        .await
                        .map_err(from_storage)?;
                    tx.commit().await.map_err(|e| from_storage(e.into()))?;

                    self.publisher
                        .publish(Event::SessionTerminating { session_id, reason: reason.clone() }, "registry")
                        .await?;
                    return Ok(());
                }

                let kernels = KernelRepo::list_for_update_by_session(&mut tx, &session_id).await.map_err(from_storage)?;
                for kernel in &kernels {
                    let mut history = kernel.status_history.clone();
                    record_transition(&mut history, Status::Terminated, epoch_ms);
                    KernelRepo::update_status(&mut tx, &kernel.id, Status::Terminated, &history).await.map_err(from_storage)?;
                    if let Some(agent_id) = &kernel.agent_id {
                        if let Some(agent) = AgentRepo::find_for_update(&mut tx, agent_id).await.map_err(from_storage)? {
                            let released = &agent.occupied_slots - &kernel.occupied_slots;
                            AgentRepo::set_occupied_slots(&mut tx, agent_id, &released).await.map_err(from_storage)?;
                        }
                    }
                }
                let mut history = session.status_history.clone();
                record_transition(&mut history, Status::Terminated, epoch_ms);
                SessionRepo::update_status(&mut tx, &session_id, Status::Terminated, &history).await.map_err(from_storage)?;
                tx.commit().await.map_err(|e| from_storage(e.into()))?;

                self.counters
                    .decr_concurrency(&session.access_key.0, concurrency_kind_for_session(session.session_type))
                    .await
                    .map_err(from_storage)?;
                self.publisher
                    .publish(
                        Event::SessionTerminated {
                            session_id,
                            reason: bai_core::TransitionReason::ForceTerminated.to_string(),
                        },
                        "registry",
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// §4.5 `restart_session`. `Status` has no `Restarting` variant (§9
    /// Open Question, resolved in DESIGN.md): this only operates on a
    /// RUNNING session's already-RUNNING kernels, performing the RPC and a
    /// direct field refresh without any FSM transition — the same bypass
    /// `destroy_session`'s force path and `scheduler::force_failed_start`
    /// use for operations the legal-transition table doesn't model.
    pub async fn restart_session(&self, session_id: SessionId) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .find_by_id(&session_id)
            .await
            .map_err(from_storage)?
            .ok_or_else(|| RegistryError::not_found(format!("session {session_id} not found")))?;
        if session.status != Status::Running {
            return Err(RegistryError::invalid_argument("only a RUNNING session can be restarted"));
        }
        let kernels = self.kernels.list_by_session(&session_id).await.map_err(from_storage)?;
        let epoch_ms = self.epoch_ms();

        let mut failures = Vec::new();
        for kernel in &kernels {
            let Some(agent_id) = kernel.agent_id else {
                failures.push(AgentFailure { agent_id: "unassigned".into(), error: "kernel has no agent".into() });
                continue;
            };
            let outcome = self.restart_one_kernel(session_id, agent_id, kernel, &session).await;
            match outcome {
                Ok(info) => {
                    let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
                    let mut history = kernel.status_history.clone();
                    record_transition(&mut history, Status::Running, epoch_ms);
                    KernelRepo::mark_started(
                        &mut tx,
                        &kernel.id,
                        &info.resource_spec.allocations,
                        &info.ports,
                        &info.service_ports,
                        &info.container_id,
                        &history,
                    )
                    .await
                    .map_err(from_storage)?;
                    tx.commit().await.map_err(|e| from_storage(e.into()))?;
                }
                Err(e) => failures.push(AgentFailure { agent_id: agent_id.to_string(), error: e.to_string() }),
            }
        }
        if !failures.is_empty() {
            return Err(RegistryError::MultiAgentError(failures));
        }

        self.publisher
            .publish(
                Event::SessionStarted { session_id, creation_id: session.creation_id.clone().unwrap_or_default() },
                "registry",
            )
            .await?;

        if session.session_type == SessionType::Batch {
            if let (Some(main_kernel), Some(command)) =
                (kernels.iter().find(|k| k.is_main()), session.main_image().and(kernels.iter().find(|k| k.is_main()).and_then(|k| k.startup_command.clone())))
            {
                if let Err(e) = self.execute(session_id, 4, &nanoid::nanoid!(), "batch", &command, &BTreeMap::new()).await {
                    tracing::warn!(session_id = %session_id, kernel_id = %main_kernel.id, error = %e, "failed to re-trigger batch execution after restart");
                }
            }
        }
        Ok(())
    }

    async fn restart_one_kernel(
        &self,
        session_id: SessionId,
        agent_id: AgentId,
        kernel: &Kernel,
        session: &Session,
    ) -> Result<bai_wire::KernelCreationInfo, RegistryError> {
        let ctx = self
            .rpc
            .rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_write_timeout)
            .map_err(from_rpc)?;
        let image_config = self.image_config_for(&kernel.image).await?;
        let updated_config = self.kernel_creation_config_for(session, kernel).await?;
        ctx.invoke(ctx.transport().restart_kernel(&agent_id, session_id, kernel.id, &image_config, &updated_config))
            .await
            .map_err(from_rpc)
    }

    async fn image_config_for(&self, image_ref: &ImageRef) -> Result<ImageConfig, RegistryError> {
        let image = self
            .images
            .find_by_canonical_and_arch(&image_ref.canonical, &image_ref.architecture)
            .await
            .map_err(from_storage)?
            .ok_or_else(|| RegistryError::not_found(format!("image {} not found", image_ref.canonical)))?;
        Ok(ImageConfig {
            canonical: image.canonical,
            architecture: image.architecture,
            registry_url: image.registry,
            digest: image.digest,
        })
    }

    async fn kernel_creation_config_for(&self, session: &Session, kernel: &Kernel) -> Result<KernelCreationConfig, RegistryError> {
        let image = self.image_config_for(&kernel.image).await?;
        let mounts = self.vfolders.mounts_for_session(&session.id).await.map_err(from_storage)?;
        Ok(KernelCreationConfig {
            kernel_id: kernel.id,
            image,
            resource_slots: kernel.requested_slots.clone(),
            resource_opts: BTreeMap::new(),
            environ: session.environ.clone(),
            vfolder_mounts: mounts.into_iter().map(|m| m.mount_path).collect(),
            cluster_role: match kernel.cluster_role {
                ClusterRole::Main => ClusterRoleAssignment::Main,
                ClusterRole::Sub => ClusterRoleAssignment::Sub,
            },
            cluster_idx: kernel.cluster_idx,
            startup_command: kernel.startup_command.clone(),
            bootstrap_script: kernel.bootstrap_script.clone(),
            preopen_ports: Vec::new(),
        })
    }

    async fn main_kernel(&self, session_id: SessionId) -> Result<Kernel, RegistryError> {
        self.kernels
            .find_main_kernel(&session_id)
            .await
            .map_err(from_storage)?
            .ok_or_else(|| RegistryError::not_found(format!("session {session_id} has no main kernel")))
    }

    async fn main_kernel_location(&self, session_id: SessionId) -> Result<(AgentId, KernelId), RegistryError> {
        let kernel = self.main_kernel(session_id).await?;
        let agent_id = kernel
            .agent_id
            .ok_or_else(|| RegistryError::invalid_argument("main kernel has no assigned agent"))?;
        Ok((agent_id, kernel.id))
    }

    /// Thin wrapper (§4.5): resolves the main kernel, opens an RPC context
    /// keyed by session id, and translates transport errors.
    pub async fn execute(
        &self,
        session_id: SessionId,
        api_major: u32,
        run_id: &str,
        mode: &str,
        code: &str,
        opts: &BTreeMap<String, String>,
    ) -> Result<ExecutionResult, RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_write_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().execute(&agent_id, kernel_id, api_major, run_id, mode, code, opts, self.config.rpc_write_timeout))
            .await
            .map_err(from_rpc)
    }

    pub async fn interrupt_kernel(&self, session_id: SessionId) -> Result<(), RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_read_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().interrupt_kernel(&agent_id, kernel_id)).await.map_err(from_rpc)
    }

    pub async fn get_completions(
        &self,
        session_id: SessionId,
        text: &str,
        opts: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_read_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().get_completions(&agent_id, kernel_id, text, opts)).await.map_err(from_rpc)
    }

    pub async fn start_service(
        &self,
        session_id: SessionId,
        service: &str,
        opts: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_write_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().start_service(&agent_id, kernel_id, service, opts)).await.map_err(from_rpc)
    }

    pub async fn shutdown_service(&self, session_id: SessionId, service: &str) -> Result<(), RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_write_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().shutdown_service(&agent_id, kernel_id, service)).await.map_err(from_rpc)
    }

    pub async fn upload_file(&self, session_id: SessionId, filename: &str, bytes: &[u8]) -> Result<(), RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_write_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().upload_file(&agent_id, kernel_id, filename, bytes)).await.map_err(from_rpc)
    }

    pub async fn download_file(&self, session_id: SessionId, path: &str) -> Result<Vec<u8>, RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_read_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().download_file(&agent_id, kernel_id, path)).await.map_err(from_rpc)
    }

    pub async fn list_files(&self, session_id: SessionId, path: &str) -> Result<Vec<String>, RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_read_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().list_files(&agent_id, kernel_id, path)).await.map_err(from_rpc)
    }

    pub async fn get_logs(&self, session_id: SessionId) -> Result<String, RegistryError> {
        let (agent_id, kernel_id) = self.main_kernel_location(session_id).await?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_read_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().get_logs(&agent_id, kernel_id)).await.map_err(from_rpc)
    }

    /// §4.5 `commit_session`: requires the main kernel to be RUNNING.
    pub async fn commit_session(
        &self,
        session_id: SessionId,
        email: &str,
        canonical_or_filename: &str,
        extra_labels: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        let kernel = self.main_kernel(session_id).await?;
        if kernel.status != Status::Running {
            return Err(RegistryError::invalid_argument("commit requires the main kernel to be RUNNING"));
        }
        let agent_id = kernel.agent_id.ok_or_else(|| RegistryError::invalid_argument("main kernel has no assigned agent"))?;
        let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), self.config.rpc_write_timeout).map_err(from_rpc)?;
        ctx.invoke(ctx.transport().commit(&agent_id, kernel.id, email, canonical_or_filename, extra_labels))
            .await
            .map_err(from_rpc)
    }

    pub async fn commit_session_to_file(&self, session_id: SessionId, email: &str, filename: &str) -> Result<(), RegistryError> {
        self.commit_session(session_id, email, filename, &BTreeMap::new()).await
    }

    /// §4.5 `handle_heartbeat`: row-locked agent upsert/revive, cache
    /// refresh, and image reverse-index maintenance.
    pub async fn handle_heartbeat(
        &self,
        agent_id: AgentId,
        address: &str,
        public_key: &str,
        scaling_group: &str,
        available_slots: &ResourceSlots,
        architecture: &str,
        version: &str,
        images: &[String],
    ) -> Result<(), RegistryError> {
        let epoch_ms = self.epoch_ms();
        let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
        let existing = AgentRepo::find_for_update(&mut tx, &agent_id).await.map_err(from_storage)?;
        let revived = match existing {
            None => {
                let agent = Agent {
                    id: agent_id,
                    address: address.to_string(),
                    public_key: public_key.to_string(),
                    scaling_group: scaling_group.to_string(),
                    status: AgentStatus::Alive,
                    available_slots: available_slots.clone(),
                    occupied_slots: ResourceSlots::new(),
                    architecture: architecture.to_string(),
                    version: version.to_string(),
                    last_seen_epoch_ms: epoch_ms,
                    lost_at_epoch_ms: None,
                    cached_images: images.to_vec(),
                };
                AgentRepo::insert(&mut tx, &agent).await.map_err(from_storage)?;
                false
            }
            Some(mut agent) => {
                let was_down = matches!(agent.status, AgentStatus::Lost | AgentStatus::Terminated);
                let address_changed = agent.address != address || agent.public_key != public_key;
                agent.address = address.to_string();
                agent.public_key = public_key.to_string();
                agent.scaling_group = scaling_group.to_string();
                agent.status = AgentStatus::Alive;
                agent.available_slots = available_slots.clone();
                agent.architecture = architecture.to_string();
                agent.version = version.to_string();
                agent.last_seen_epoch_ms = epoch_ms;
                agent.lost_at_epoch_ms = None;
                agent.cached_images = images.to_vec();
                AgentRepo::update(&mut tx, &agent).await.map_err(from_storage)?;
                if address_changed {
                    self.cache.invalidate(&agent_id);
                }
                was_down
            }
        };
        tx.commit().await.map_err(|e| from_storage(e.into()))?;

        self.cache.update(agent_id, address.to_string(), public_key.to_string());
        for image in images {
            self.counters.image_agents_add(image, &agent_id).await.map_err(from_storage)?;
        }
        if revived {
            self.publisher.publish(Event::AgentStarted { agent_id, reason: "revived".into() }, "registry").await?;
        }
        Ok(())
    }

    /// §4.5 `recalc_resource_usage`: re-sums each agent's occupied slots
    /// from its occupying kernels (zeroing agents with none) and
    /// recomputes both keypair concurrency counters from scratch, to
    /// recover from any drift the incremental counters accumulated.
    pub async fn recalc_resource_usage(&self) -> Result<(), RegistryError> {
        let occupying_sessions = self.sessions.list_occupying().await.map_err(from_storage)?;
        let mut per_agent: HashMap<AgentId, ResourceSlots> = HashMap::new();
        let mut compute_counts: HashMap<String, i64> = HashMap::new();
        let mut system_counts: HashMap<String, i64> = HashMap::new();

        for session in &occupying_sessions {
            let kernels = self.kernels.list_by_session(&session.id).await.map_err(from_storage)?;
            let mut occupies = false;
            for kernel in &kernels {
                if !kernel.status.is_occupying() {
                    continue;
                }
                occupies = true;
                if let Some(agent_id) = kernel.agent_id {
                    let entry = per_agent.entry(agent_id).or_default();
                    *entry = &*entry + &kernel.occupied_slots;
                }
            }
            if occupies {
                let counts = match concurrency_kind_for_session(session.session_type) {
                    ConcurrencyKind::Compute => &mut compute_counts,
                    ConcurrencyKind::System => &mut system_counts,
                };
                *counts.entry(session.access_key.0.clone()).or_insert(0) += 1;
            }
        }

        let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
        for agent in self.agents.list_all().await.map_err(from_storage)? {
            let occupied = per_agent.get(&agent.id).cloned().unwrap_or_default();
            AgentRepo::set_occupied_slots(&mut tx, &agent.id, &occupied).await.map_err(from_storage)?;
        }
        tx.commit().await.map_err(|e| from_storage(e.into()))?;

        for (access_key, count) in compute_counts {
            self.counters.set_concurrency(&access_key, ConcurrencyKind::Compute, count).await.map_err(from_storage)?;
        }
        for (access_key, count) in system_counts {
            self.counters.set_concurrency(&access_key, ConcurrencyKind::System, count).await.map_err(from_storage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bai_core::{AccessKey, DomainName, NetworkType, ProjectName};

    fn owner() -> OwnerScope {
        OwnerScope {
            domain: DomainName("default".into()),
            project: ProjectName("default".into()),
            access_key: AccessKey("AKIATEST".into()),
            user_id: uuid::Uuid::nil(),
        }
    }

    fn request() -> CreateSessionRequest {
        CreateSessionRequest {
            name: "my-session".into(),
            owner: owner(),
            session_type: SessionType::Interactive,
            cluster_mode: ClusterMode::SingleNode,
            cluster_size: 1,
            priority: 0,
            image: ImageRef::new("python", "x86_64"),
            requested_slots: ResourceSlots::new(),
            environ: BTreeMap::new(),
            vfolder_mounts: Vec::new(),
            startup_command: None,
            bootstrap_script: None,
            starts_at_epoch_ms: None,
            batch_timeout_secs: None,
            callback_url: None,
            network_type: NetworkType::Volatile,
            depends_on: Vec::new(),
            reuse: false,
            enqueue_only: true,
            max_wait_seconds: 1,
        }
    }

    #[test]
    fn concurrency_kind_maps_system_sessions_to_system_counter() {
        assert_eq!(concurrency_kind_for_session(SessionType::System), ConcurrencyKind::System);
        assert_eq!(concurrency_kind_for_session(SessionType::Interactive), ConcurrencyKind::Compute);
        assert_eq!(concurrency_kind_for_session(SessionType::Batch), ConcurrencyKind::Compute);
        assert_eq!(concurrency_kind_for_session(SessionType::Inference), ConcurrencyKind::Compute);
    }

    // This crate's unit tests exercise request/outcome shapes and pure
    // helpers without a database; `create_session`/`destroy_session`
    // themselves need a live Postgres/Redis pair and are not covered here.
    #[test]
    fn enqueue_only_request_is_well_formed() {
        let req = request();
        assert!(req.enqueue_only);
        assert_eq!(req.cluster_size, 1);
    }
}
