// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The registry: the struct every public command in `commands.rs` is a
//! method on, holding exactly the repos, adapters, and ambient handles
//! those commands need (§4.5).

use std::sync::Arc;

use async_trait::async_trait;
use bai_adapters::{AgentCache, RpcContextFactory};
use bai_core::{Clock, RegistryError, SessionId};
use bai_engine::SessionDestroyer;
use bai_storage::{
    AgentRepo, ImageRepo, KernelRepo, OwnerRepo, RedisCounters, SessionDependencyRepo, SessionRepo,
    VFolderRepo,
};
use sqlx::PgPool;

use crate::config::RegistryConfig;
use crate::event_publisher::EventPublisher;
use crate::waiter::LifecycleWaiterRegistry;

/// Everything `create_session`/`destroy_session`/the thin RPC wrappers need.
/// Generic over `Clock` (same non-object-safety reason as
/// `bai_engine::scheduler::Scheduler<C>`: `Clock: Clone` rules out
/// `Box<dyn Clock>`) and over the event publisher seam.
pub struct Registry<C: Clock, P: EventPublisher> {
    pub(crate) pool: PgPool,
    pub(crate) sessions: SessionRepo,
    pub(crate) kernels: KernelRepo,
    pub(crate) agents: AgentRepo,
    pub(crate) images: ImageRepo,
    pub(crate) owners: OwnerRepo,
    pub(crate) dependencies: SessionDependencyRepo,
    pub(crate) vfolders: VFolderRepo,
    pub(crate) counters: RedisCounters,
    pub(crate) rpc: RpcContextFactory,
    pub(crate) cache: AgentCache,
    pub(crate) clock: C,
    pub(crate) publisher: Arc<P>,
    pub(crate) waiters: Arc<LifecycleWaiterRegistry>,
    pub(crate) config: RegistryConfig,
}

impl<C: Clock, P: EventPublisher> Registry<C, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        sessions: SessionRepo,
        kernels: KernelRepo,
        agents: AgentRepo,
        images: ImageRepo,
        owners: OwnerRepo,
        dependencies: SessionDependencyRepo,
        vfolders: VFolderRepo,
        counters: RedisCounters,
        rpc: RpcContextFactory,
        cache: AgentCache,
        clock: C,
        publisher: Arc<P>,
        waiters: Arc<LifecycleWaiterRegistry>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            pool,
            sessions,
            kernels,
            agents,
            images,
            owners,
            dependencies,
            vfolders,
            counters,
            rpc,
            cache,
            clock,
            publisher,
            waiters,
            config,
        }
    }

    pub(crate) fn epoch_ms(&self) -> i64 {
        self.clock.epoch_ms() as i64
    }
}

/// Lets `bai-engine`'s `DoTerminateSessionHandler` call back into
/// `destroy_session` without this crate's callers needing to know that
/// `DoTerminateSession` always destroys with `forced=true` (the event is
/// itself an authoritative decision, not a user request subject to the
/// same-state rejection rules a direct API call would get).
#[async_trait]
impl<C: Clock, P: EventPublisher> SessionDestroyer for Registry<C, P> {
    async fn destroy(&self, session_id: SessionId, reason: String) -> Result<(), RegistryError> {
        self.destroy_session(session_id, true, reason, true).await
    }
}
