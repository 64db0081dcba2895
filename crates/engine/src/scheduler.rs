// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The scheduler/dispatcher (§4.4): scaling-group choice, quota checks,
//! agent selection, image-pull kickoff, kernel creation, and resource
//! settle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bai_adapters::RpcContextFactory;
use bai_core::{
    Agent, AgentId, ClusterMode, ClusterRole, Clock, Kernel, KernelId, RegistryError,
    ResourceSlots, Session, SessionId, Status,
};
use bai_storage::{
    repo::networks::NetworkKind, AgentRepo, ImageRepo, KernelRepo, NetworkRepo, OwnerRepo,
    SessionDependencyRepo, SessionRepo,
};
use bai_wire::{
    ClusterInfo, ClusterRoleAssignment, ImageConfig, KernelCreationConfig, DEFAULT_WRITE_TIMEOUT,
};
use sqlx::PgPool;

use crate::error::{from_rpc, from_storage};
use crate::fsm::{recompute_session_status, transition_kernel};
use crate::updatable_set::UpdatableSet;

/// Per-kernel agent assignment produced by [`select_agents`], plus whether a
/// network needs to be created for the session (§4.4 "Agent selection").
pub struct Placement {
    pub assignments: BTreeMap<KernelId, AgentId>,
    pub network: Option<NetworkPlan>,
}

pub struct NetworkPlan {
    pub kind: NetworkKind,
    /// `Some` only for a local network, which is homed on the single agent
    /// running the whole cluster.
    pub home_agent: Option<AgentId>,
}

/// Sorts candidates by the §4.4 tie-break: most free slots (by memory),
/// then lexical id, descending/ascending respectively.
fn sort_candidates(candidates: &mut [Agent]) {
    candidates.sort_by(|a, b| {
        b.free_slots()
            .mem_bytes()
            .cmp(&a.free_slots().mem_bytes())
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
}

/// Pure agent-selection policy (§4.4 "Agent selection"), independent of
/// storage so it can be unit tested against in-memory fixtures.
pub fn select_agents(
    candidates: &[Agent],
    kernels: &[Kernel],
    cluster_mode: ClusterMode,
) -> Result<Placement, RegistryError> {
    let mut sorted = candidates.to_vec();
    sort_candidates(&mut sorted);

    match (cluster_mode, kernels.len()) {
        (ClusterMode::SingleNode, 1) => {
            let kernel = &kernels[0];
            let agent = sorted
                .iter()
                .find(|a| a.can_fit(&kernel.requested_slots))
                .ok_or_else(|| RegistryError::not_found("no agent with sufficient free slots"))?;
            let mut assignments = BTreeMap::new();
            assignments.insert(kernel.id, agent.id);
            Ok(Placement { assignments, network: None })
        }
        (ClusterMode::SingleNode, _) => {
            let total = kernels
                .iter()
                .fold(ResourceSlots::new(), |acc, k| &acc + &k.requested_slots);
            let agent = sorted
                .iter()
                .find(|a| a.can_fit(&total))
                .ok_or_else(|| RegistryError::not_found("no single agent can fit the whole cluster"))?;
            let assignments = kernels.iter().map(|k| (k.id, agent.id)).collect();
            Ok(Placement {
                assignments,
                network: Some(NetworkPlan { kind: NetworkKind::Local, home_agent: Some(agent.id) }),
            })
        }
        (ClusterMode::MultiNode, _) => {
            // First-fit-decreasing bin pack: largest kernel first, placed on
            // the first candidate (by the same tie-break order) it fits in.
            let mut remaining: Vec<ResourceSlots> = sorted.iter().map(Agent::free_slots).collect();
            let mut order: Vec<usize> = (0..kernels.len()).collect();
            order.sort_by(|&a, &b| {
                kernels[b].requested_slots.mem_bytes().cmp(&kernels[a].requested_slots.mem_bytes())
            });
            let mut assignments = BTreeMap::new();
            for idx in order {
                let kernel = &kernels[idx];
                let slot = remaining
                    .iter()
                    .position(|free| kernel.requested_slots.le_elementwise(free))
                    .ok_or_else(|| RegistryError::not_found("no candidate fits one of the kernels"))?;
                remaining[slot] = &remaining[slot] - &kernel.requested_slots;
                assignments.insert(kernel.id, sorted[slot].id);
            }
            Ok(Placement {
                assignments,
                network: Some(NetworkPlan { kind: NetworkKind::Overlay, home_agent: None }),
            })
        }
    }
}

pub struct Scheduler<C: Clock> {
    pool: PgPool,
    owners: OwnerRepo,
    agents: AgentRepo,
    sessions: SessionRepo,
    kernels: KernelRepo,
    images: ImageRepo,
    networks: NetworkRepo,
    dependencies: SessionDependencyRepo,
    rpc: RpcContextFactory,
    clock: C,
    updatable: Arc<UpdatableSet>,
}

impl<C: Clock> Scheduler<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        owners: OwnerRepo,
        agents: AgentRepo,
        sessions: SessionRepo,
        kernels: KernelRepo,
        images: ImageRepo,
        networks: NetworkRepo,
        dependencies: SessionDependencyRepo,
        rpc: RpcContextFactory,
        clock: C,
        updatable: Arc<UpdatableSet>,
    ) -> Self {
        Self { pool, owners, agents, sessions, kernels, images, networks, dependencies, rpc, clock, updatable }
    }

    fn epoch_ms(&self) -> i64 {
        self.clock.epoch_ms() as i64
    }

    /// Derives the allowed scaling groups for `session`'s owner scope and
    /// returns the chosen one (§4.4 "Scaling-group choice").
    async fn choose_scaling_group(&self, session: &Session) -> Result<String, RegistryError> {
        if let Some(sg) = &session.scaling_group {
            return Ok(sg.clone());
        }
        let candidates = self.owners.scaling_groups_for_domain(&session.domain.0).await.map_err(from_storage)?;
        let session_type = session.session_type.to_string();
        candidates
            .into_iter()
            .find(|sg| sg.allowed_session_types.iter().any(|t| t == &session_type))
            .map(|sg| sg.name)
            .ok_or_else(|| RegistryError::not_found(format!("no scaling group allows session type {session_type}")))
    }

    /// Compares requested slots against keypair, project, and domain
    /// remaining capacity, using the smallest of the three bounds per slot
    /// (§4.4 "Quota checks").
    async fn check_quota(&self, session: &Session) -> Result<(), RegistryError> {
        let requested = session.requested_slots.clone();

        let policy = self
            .owners
            .keypair_resource_policy(&session.access_key.0)
            .await
            .map_err(from_storage)?
            .ok_or_else(|| RegistryError::not_found("no resource policy for keypair"))?;
        let project_limit = self
            .owners
            .project_total_slots(&session.domain.0, &session.project.0)
            .await
            .map_err(from_storage)?
            .unwrap_or_default();
        let domain_limit = self.owners.domain_total_slots(&session.domain.0).await.map_err(from_storage)?.unwrap_or_default();

        let occupying = self.sessions.list_occupying().await.map_err(from_storage)?;
        let keypair_occupied = occupying
            .iter()
            .filter(|s| s.access_key == session.access_key)
            .fold(ResourceSlots::new(), |acc, s| &acc + &s.occupied_slots);
        let project_occupied = occupying
            .iter()
            .filter(|s| s.domain == session.domain && s.project == session.project)
            .fold(ResourceSlots::new(), |acc, s| &acc + &s.occupied_slots);
        let domain_occupied = occupying
            .iter()
            .filter(|s| s.domain == session.domain)
            .fold(ResourceSlots::new(), |acc, s| &acc + &s.occupied_slots);

        for slot in requested.slot_names() {
            let keypair_remaining = policy.total_resource_slots.0.get(slot) - keypair_occupied.get(slot);
            let project_remaining = project_limit.get(slot) - project_occupied.get(slot);
            let domain_remaining = domain_limit.get(slot) - domain_occupied.get(slot);
            let bound = keypair_remaining.min(project_remaining).min(domain_remaining);
            if requested.get(slot) > bound {
                return Err(RegistryError::quota_exceeded(format!(
                    "slot {slot}: requested {} exceeds remaining capacity {bound}",
                    requested.get(slot)
                )));
            }
        }
        Ok(())
    }

    /// A session with an edge `session -> depends_on` only becomes eligible
    /// for scheduling once every `depends_on` has reached a success-terminal
    /// state. `Terminated` is the only status that counts: `Cancelled` and
    /// `Error` are terminal but not successful, so a session waiting on a
    /// cancelled or errored dependency is stuck pending rather than silently
    /// proceeding.
    async fn dependencies_satisfied(&self, session: &Session) -> Result<bool, RegistryError> {
        let graph = self.dependencies.list_for_owner(&session.access_key.0).await.map_err(from_storage)?;
        for edge in graph.iter().filter(|e| e.session_id == session.id) {
            let dep = self
                .sessions
                .find_by_id(&edge.depends_on)
                .await
                .map_err(from_storage)?
                .ok_or_else(|| RegistryError::IntegrityError(format!("dependency {} vanished", edge.depends_on)))?;
            if dep.status != Status::Terminated {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Assigns agents to a PENDING session's kernels and transitions them to
    /// SCHEDULED. Leaves the session PENDING (untouched by the caller's
    /// retry loop) on any rejectable failure, including an unsatisfied
    /// dependency — that is not an error, just a reason to retry next tick.
    pub async fn schedule_session(&self, session_id: SessionId) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .find_by_id(&session_id)
            .await
            .map_err(from_storage)?
            .ok_or_else(|| RegistryError::not_found("session not found"))?;
        if session.status != Status::Pending {
            return Ok(());
        }
        if !self.dependencies_satisfied(&session).await? {
            return Ok(());
        }

        let scaling_group = self.choose_scaling_group(&session).await?;
        self.check_quota(&session).await?;

        let kernels = self.kernels.list_by_session(&session_id).await.map_err(from_storage)?;
        let candidates = self.agents.list_alive_in_scaling_group(&scaling_group).await.map_err(from_storage)?;
        let placement = select_agents(&candidates, &kernels, session.cluster_mode)?;

        let epoch_ms = self.epoch_ms();
        let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;

        if session.scaling_group.as_deref() != Some(scaling_group.as_str()) {
            SessionRepo::update_scaling_group(&mut tx, &session_id, &scaling_group)
                .await
                .map_err(from_storage)?;
        }

        if let Some(network) = &placement.network {
            let network_id = format!("net-{session_id}");
            NetworkRepo::insert(&mut tx, &network_id, clone_kind(&network.kind), network.home_agent.as_ref())
                .await
                .map_err(from_storage)?;
        }

        for kernel in &kernels {
            let agent_id = placement
                .assignments
                .get(&kernel.id)
                .ok_or_else(|| RegistryError::IntegrityError(format!("kernel {} left unassigned", kernel.id)))?;
            KernelRepo::assign_agent(&mut tx, &kernel.id, agent_id).await.map_err(from_storage)?;
            let mut history = kernel.status_history.clone();
            transition_kernel(&mut tx, &kernel.id, kernel.status, Status::Scheduled, &mut history, epoch_ms).await?;
        }

        let mut session_history = session.status_history.clone();
        recompute_session_status(
            &mut tx,
            session_id,
            session.status,
            session.creation_id.as_deref().unwrap_or(""),
            &mut session_history,
            epoch_ms,
        )
        .await?;

        tx.commit().await.map_err(|e| from_storage(e.into()))?;
        Ok(())
    }

    /// For each distinct `(agent, image)` pair among a session's SCHEDULED
    /// kernels, issues `check_and_pull` (§4.4 "Image pull"). The resulting
    /// PULLING/PREPARED/CANCELLED transitions happen in the event handlers
    /// that observe `ImagePullStarted/Finished/Failed`, not here.
    pub async fn start_image_pulls(&self, session_id: SessionId) -> Result<(), RegistryError> {
        let kernels = self.kernels.list_by_session(&session_id).await.map_err(from_storage)?;
        let mut by_agent: BTreeMap<AgentId, Vec<ImageConfig>> = BTreeMap::new();
        for kernel in kernels.iter().filter(|k| k.status == Status::Scheduled) {
            let Some(agent_id) = kernel.agent_id else { continue };
            let image = self
                .images
                .find_by_canonical_and_arch(&kernel.image.canonical, &kernel.image.architecture)
                .await
                .map_err(from_storage)?
                .ok_or_else(|| RegistryError::not_found(format!("image {} not resolved", kernel.image.canonical)))?;
            by_agent.entry(agent_id).or_default().push(ImageConfig {
                canonical: image.canonical,
                architecture: image.architecture,
                registry_url: image.registry,
                digest: image.digest,
            });
        }

        for (agent_id, images) in by_agent {
            let ctx = self.rpc.rpc_context(agent_id, Some(session_id.to_string()), DEFAULT_WRITE_TIMEOUT)?;
            ctx.invoke(ctx.transport().check_and_pull(&agent_id, &images)).await.map_err(from_rpc)?;
        }
        Ok(())
    }

    /// When every kernel of a session has reached PREPARED, groups them by
    /// agent and issues one `create_kernels` RPC per agent (§4.4 "Kernel
    /// creation"). On RPC failure every kernel of the session is forced to
    /// TERMINATED with reason `FAILED_TO_START`.
    pub async fn try_create_kernels(&self, session: &Session) -> Result<(), RegistryError> {
        let kernels = self.kernels.list_by_session(&session.id).await.map_err(from_storage)?;
        if kernels.is_empty() || !kernels.iter().all(|k| k.status == Status::Prepared) {
            return Ok(());
        }

        let mut by_agent: BTreeMap<AgentId, Vec<&Kernel>> = BTreeMap::new();
        for kernel in &kernels {
            let Some(agent_id) = kernel.agent_id else {
                return Err(RegistryError::IntegrityError(format!("prepared kernel {} has no agent", kernel.id)));
            };
            by_agent.entry(agent_id).or_default().push(kernel);
        }

        let mut replicas: BTreeMap<String, u32> = BTreeMap::new();
        for kernel in &kernels {
            *replicas.entry(kernel.cluster_role.to_string()).or_insert(0) += 1;
        }
        let cluster_info = ClusterInfo {
            mode: session.cluster_mode.to_string(),
            size: session.cluster_size,
            replicas,
            ssh_keypair: None,
            ssh_port_map: BTreeMap::new(),
        };

        for (agent_id, agent_kernels) in &by_agent {
            let kernel_ids: Vec<KernelId> = agent_kernels.iter().map(|k| k.id).collect();
            let mut configs = Vec::with_capacity(agent_kernels.len());
            for k in agent_kernels {
                let image = self
                    .images
                    .find_by_canonical_and_arch(&k.image.canonical, &k.image.architecture)
                    .await
                    .map_err(from_storage)?
                    .ok_or_else(|| RegistryError::not_found(format!("image {} not resolved", k.image.canonical)))?;
                configs.push(KernelCreationConfig {
                    kernel_id: k.id,
                    image: ImageConfig {
                        canonical: image.canonical,
                        architecture: image.architecture,
                        registry_url: image.registry,
                        digest: image.digest,
                    },
                    resource_slots: k.requested_slots.clone(),
                    resource_opts: BTreeMap::new(),
                    environ: session.environ.clone(),
                    vfolder_mounts: session.vfolder_mounts.iter().map(|m| m.mount_path.clone()).collect(),
                    cluster_role: match k.cluster_role {
                        ClusterRole::Main => ClusterRoleAssignment::Main,
                        ClusterRole::Sub => ClusterRoleAssignment::Sub,
                    },
                    cluster_idx: k.cluster_idx,
                    startup_command: k.startup_command.clone(),
                    bootstrap_script: k.bootstrap_script.clone(),
                    preopen_ports: Vec::new(),
                });
            }

            let ctx = self.rpc.rpc_context(*agent_id, Some(session.id.to_string()), DEFAULT_WRITE_TIMEOUT)?;
            let result = ctx
                .invoke(ctx.transport().create_kernels(agent_id, session.id, &kernel_ids, &configs, &cluster_info))
                .await;

            match result {
                Ok(infos) => self.apply_creation_results(session.id, *agent_id, &infos).await?,
                Err(err) => {
                    self.force_failed_start(session.id, &kernels).await?;
                    return Err(from_rpc(err));
                }
            }
        }
        Ok(())
    }

    async fn apply_creation_results(
        &self,
        session_id: SessionId,
        agent_id: AgentId,
        infos: &[bai_wire::KernelCreationInfo],
    ) -> Result<(), RegistryError> {
        let epoch_ms = self.epoch_ms();
        let mut actual_total = ResourceSlots::new();
        let mut requested_total = ResourceSlots::new();

        let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
        for info in infos {
            let kernel = KernelRepo::find_for_update(&mut tx, &info.kernel_id)
                .await
                .map_err(from_storage)?
                .ok_or_else(|| RegistryError::not_found(format!("kernel {} vanished mid-creation", info.kernel_id)))?;
            requested_total = &requested_total + &kernel.requested_slots;
            actual_total = &actual_total + &info.resource_spec.allocations;

            let mut history = kernel.status_history.clone();
            bai_core::record_transition(&mut history, Status::Running, epoch_ms);
            KernelRepo::mark_started(
                &mut tx,
                &info.kernel_id,
                &info.resource_spec.allocations,
                &info.ports,
                &info.service_ports,
                &info.container_id,
                &history,
            )
            .await
            .map_err(from_storage)?;
        }

        // §4.4 "Resource settle": adjust the agent's occupied_slots by the
        // delta between actual and requested allocations, in this same tx.
        if actual_total != requested_total {
            if let Some(agent) = AgentRepo::find_for_update(&mut tx, &agent_id).await.map_err(from_storage)? {
                let delta = &actual_total - &requested_total;
                let adjusted = &agent.occupied_slots + &delta;
                AgentRepo::set_occupied_slots(&mut tx, &agent_id, &adjusted).await.map_err(from_storage)?;
            }
        }

        tx.commit().await.map_err(|e| from_storage(e.into()))?;
        // Kernels just moved PREPARED -> RUNNING; register the session so
        // the daemon's next drain re-aggregates it (§4.3 "updatable set").
        self.updatable.register(session_id);
        Ok(())
    }

    /// On a failed `create_kernels` call, force every kernel of the session
    /// to TERMINATED with `FAILED_TO_START` (§4.4 "Kernel creation").
    async fn force_failed_start(&self, session_id: SessionId, kernels: &[Kernel]) -> Result<(), RegistryError> {
        let epoch_ms = self.epoch_ms();
        let mut tx = self.pool.begin().await.map_err(|e| from_storage(e.into()))?;
        for kernel in kernels {
            let mut history = kernel.status_history.clone();
            // CREATING/PREPARED both legally reach TERMINATED only via
            // TERMINATING in the table; a failed creation is a direct force,
            // matching the source's "force" semantics rather than the
            // graceful teardown path.
            bai_core::record_transition(&mut history, Status::Terminated, epoch_ms);
            KernelRepo::update_status(&mut tx, &kernel.id, Status::Terminated, &history)
                .await
                .map_err(from_storage)?;
        }
        tx.commit().await.map_err(|e| from_storage(e.into()))?;
        self.updatable.register(session_id);
        Ok(())
    }
}

fn clone_kind(kind: &NetworkKind) -> NetworkKind {
    match kind {
        NetworkKind::Local => NetworkKind::Local,
        NetworkKind::Overlay => NetworkKind::Overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bai_core::{AgentStatus, ClusterRole, ImageRef};
    use rust_decimal::Decimal;

    fn agent(id: &str, mem_free: i64) -> Agent {
        let mut a = Agent::builder(AgentId::from_string(id)).status(AgentStatus::Alive).build();
        a.available_slots.set("mem", Decimal::from(mem_free));
        a
    }

    fn kernel(id: &str, session: &str, mem: i64, role: ClusterRole, idx: u32) -> Kernel {
        let mut requested = ResourceSlots::new();
        requested.set("mem", Decimal::from(mem));
        Kernel {
            id: bai_core::KernelId::from_string(id),
            session_id: bai_core::SessionId::from_string(session),
            cluster_role: role,
            cluster_idx: idx,
            agent_id: None,
            image: ImageRef::new("python", "x86_64"),
            requested_slots: requested,
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
        }
    }

    #[test]
    fn single_node_one_kernel_picks_most_free() {
        let candidates = vec![agent("agt-a", 1000), agent("agt-b", 5000)];
        let kernels = vec![kernel("kern-1", "sess-1", 100, ClusterRole::Main, 0)];
        let placement = select_agents(&candidates, &kernels, ClusterMode::SingleNode).unwrap();
        assert_eq!(placement.assignments[&kernels[0].id].as_str(), "agt-b");
        assert!(placement.network.is_none());
    }

    #[test]
    fn single_node_multi_kernel_needs_one_agent_for_all() {
        let candidates = vec![agent("agt-a", 150), agent("agt-b", 5000)];
        let kernels = vec![
            kernel("kern-1", "sess-1", 100, ClusterRole::Main, 0),
            kernel("kern-2", "sess-1", 100, ClusterRole::Sub, 1),
        ];
        let placement = select_agents(&candidates, &kernels, ClusterMode::SingleNode).unwrap();
        assert!(placement.assignments.values().all(|a| a.as_str() == "agt-b"));
        assert!(placement.network.is_some());
    }

    #[test]
    fn multi_node_bin_packs_largest_first() {
        let candidates = vec![agent("agt-a", 100), agent("agt-b", 100)];
        let kernels = vec![
            kernel("kern-1", "sess-1", 80, ClusterRole::Main, 0),
            kernel("kern-2", "sess-1", 80, ClusterRole::Sub, 1),
        ];
        let placement = select_agents(&candidates, &kernels, ClusterMode::MultiNode).unwrap();
        let a = placement.assignments[&kernels[0].id];
        let b = placement.assignments[&kernels[1].id];
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn no_candidate_fits_is_rejected() {
        let candidates = vec![agent("agt-a", 10)];
        let kernels = vec![kernel("kern-1", "sess-1", 100, ClusterRole::Main, 0)];
        assert!(select_agents(&candidates, &kernels, ClusterMode::SingleNode).is_err());
    }
}
