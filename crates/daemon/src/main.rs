// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The manager process: parses config, wires storage/event-bus/registry
//! together, registers every event handler, starts the scheduler tick
//! loop, and runs until SIGINT/SIGTERM. Mirrors the teacher's `oj-daemon`
//! bootstrap shape (parse config, init tracing, build the dependency
//! graph, spawn a supervised task group, wait on a signal future), though
//! that crate carries the shape only in its `lib.rs`/`env.rs` — it has no
//! literal `main.rs` of its own.

mod config;
mod handlers_bridge;
mod tick;
mod transport;

use std::sync::Arc;

use bai_adapters::{AgentCache, RpcContextFactory};
use bai_core::SystemClock;
use bai_engine::{
    AgentErrorHandler, AgentStartedHandler, AgentTerminatedHandler, DoSyncKernelLogsHandler,
    DoTerminateSessionHandler, ImagePullHandler, KernelCancelledHandler, KernelCreatingHandler,
    KernelPreparingHandler, KernelPullingHandler, KernelStartedHandler, KernelTerminatedHandler,
    KernelTerminatingHandler, RouteCreatedHandler, Scheduler, SessionLifecycleHandler,
    SessionTerminatedHandler, UpdatableSet,
};
use bai_eventbus::{consumer_id, EventBus, Registration};
use bai_registry::{LifecycleWaiterRegistry, Registry};
use bai_storage::{
    connect_pool, migrate, AgentRepo, EndpointRepo, ImageRepo, KernelRepo, NetworkRepo, OwnerRepo,
    RedisCounters, SessionDependencyRepo, SessionRepo, VFolderRepo,
};
use handlers_bridge::HeartbeatHandler;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = config::Config::load(&config::config_path())?;

    let pool = connect_pool(&config.database_url, 10).await?;
    migrate(&pool).await?;
    let counters = RedisCounters::connect(&config.redis_url).await?;

    let (hostname, install_path, process_index) = config::worker_identity();
    let id = consumer_id(&hostname, &install_path, process_index);
    let bus = EventBus::connect(&config.redis_url, &config.stream_key, &config.group_name, id, None).await?;

    let cache = AgentCache::new();
    let transport = Arc::new(transport::UnconfiguredTransport);
    let rpc = RpcContextFactory::new(transport, cache.clone());
    let clock = SystemClock;
    let updatable = Arc::new(UpdatableSet::new());
    let waiters = Arc::new(LifecycleWaiterRegistry::new());
    let publisher = Arc::new(bus.clone());

    let registry = Arc::new(Registry::new(
        pool.clone(),
        SessionRepo::new(pool.clone()),
        KernelRepo::new(pool.clone()),
        AgentRepo::new(pool.clone()),
        ImageRepo::new(pool.clone()),
        OwnerRepo::new(pool.clone()),
        SessionDependencyRepo::new(pool.clone()),
        VFolderRepo::new(pool.clone()),
        counters.clone(),
        rpc.clone(),
        cache.clone(),
        clock.clone(),
        publisher,
        waiters.clone(),
        config.registry.clone(),
    ));

    // Recover from any counter/occupied-slot drift left by an unclean
    // previous shutdown before this worker starts handling events.
    registry.recalc_resource_usage().await?;

    register_handlers(Handlers {
        bus: &bus,
        pool: pool.clone(),
        clock: clock.clone(),
        counters: counters.clone(),
        cache: cache.clone(),
        updatable: updatable.clone(),
        rpc: rpc.clone(),
        registry: registry.clone(),
        waiters: waiters.clone(),
    });

    bus.start().await;

    let scheduler = Scheduler::new(
        pool.clone(),
        OwnerRepo::new(pool.clone()),
        AgentRepo::new(pool.clone()),
        SessionRepo::new(pool.clone()),
        KernelRepo::new(pool.clone()),
        ImageRepo::new(pool.clone()),
        NetworkRepo::new(pool.clone()),
        SessionDependencyRepo::new(pool.clone()),
        rpc.clone(),
        clock.clone(),
        updatable.clone(),
    );
    let cancel = CancellationToken::new();
    let tick_handle = tokio::spawn(tick::run(
        scheduler,
        SessionRepo::new(pool.clone()),
        pool.clone(),
        updatable.clone(),
        bus.clone(),
        clock.clone(),
        config.scheduler_tick,
        cancel.clone(),
    ));

    wait_for_shutdown().await?;
    tracing::info!("shutdown signal received, draining");
    cancel.cancel();
    let _ = tick_handle.await;
    bus.close().await;
    Ok(())
}

struct Handlers<'a> {
    bus: &'a EventBus,
    pool: sqlx::PgPool,
    clock: SystemClock,
    counters: RedisCounters,
    cache: AgentCache,
    updatable: Arc<UpdatableSet>,
    rpc: RpcContextFactory,
    registry: Arc<Registry<SystemClock, EventBus>>,
    waiters: Arc<LifecycleWaiterRegistry>,
}

/// Registers one handler per row of the event-handler table (§4.6):
/// consumer-group handlers get exactly one worker per event, subscriber
/// handlers broadcast to every worker.
fn register_handlers(h: Handlers<'_>) {
    let Handlers { bus, pool, clock, counters, cache, updatable, rpc, registry, waiters } = h;

    bus.register_consumer(Registration::new("kernel:preparing", Arc::new(KernelPreparingHandler)));
    bus.register_consumer(Registration::new(
        "kernel:pulling",
        Arc::new(KernelPullingHandler::new(pool.clone(), clock.clone(), updatable.clone())),
    ));
    bus.register_consumer(Registration::new(
        "kernel:creating",
        Arc::new(KernelCreatingHandler::new(pool.clone(), clock.clone(), updatable.clone())),
    ));
    bus.register_consumer(Registration::new(
        "kernel:started",
        Arc::new(KernelStartedHandler::new(pool.clone(), clock.clone(), updatable.clone())),
    ));
    bus.register_consumer(Registration::new("kernel:cancelled", Arc::new(KernelCancelledHandler)));
    bus.register_consumer(Registration::new("kernel:terminating", Arc::new(KernelTerminatingHandler)));
    bus.register_consumer(Registration::new(
        "kernel:terminated",
        Arc::new(KernelTerminatedHandler::new(pool.clone(), clock.clone(), counters.clone(), updatable.clone())),
    ));
    bus.register_consumer(Registration::new(
        "session:started",
        Arc::new(SessionLifecycleHandler::new(SessionRepo::new(pool.clone()), waiters.clone())),
    ));
    bus.register_consumer(Registration::new(
        "session:cancelled",
        Arc::new(SessionLifecycleHandler::new(SessionRepo::new(pool.clone()), waiters.clone())),
    ));
    bus.register_consumer(Registration::new(
        "session:terminated",
        Arc::new(SessionTerminatedHandler::new(pool.clone(), NetworkRepo::new(pool.clone()), rpc.clone())),
    ));
    bus.register_consumer(Registration::new(
        "session:do_terminate",
        Arc::new(DoTerminateSessionHandler::new(registry.clone())),
    ));
    bus.register_consumer(Registration::new(
        "route:created",
        Arc::new(RouteCreatedHandler::new(pool.clone(), EndpointRepo::new(pool.clone()), clock.clone())),
    ));
    bus.register_consumer(Registration::new(
        "kernel:do_sync_logs",
        Arc::new(DoSyncKernelLogsHandler::new(KernelRepo::new(pool.clone()), counters.clone())),
    ));
    bus.register_consumer(Registration::new(
        "image:pull_started",
        Arc::new(ImagePullHandler::new(pool.clone(), KernelRepo::new(pool.clone()), clock.clone(), updatable.clone())),
    ));
    bus.register_consumer(Registration::new(
        "image:pull_finished",
        Arc::new(ImagePullHandler::new(pool.clone(), KernelRepo::new(pool.clone()), clock.clone(), updatable.clone())),
    ));
    bus.register_consumer(Registration::new(
        "image:pull_failed",
        Arc::new(ImagePullHandler::new(pool.clone(), KernelRepo::new(pool.clone()), clock.clone(), updatable.clone())),
    ));
    bus.register_consumer(Registration::new("agent:error", Arc::new(AgentErrorHandler)));

    // Subscriber (broadcast) handlers: every worker sees these.
    bus.register_subscriber(Registration::new(
        "agent:started",
        Arc::new(AgentStartedHandler::new(pool.clone(), cache.clone())),
    ));
    bus.register_subscriber(Registration::new(
        "agent:terminated",
        Arc::new(AgentTerminatedHandler::new(pool.clone(), cache.clone(), counters.clone())),
    ));
    bus.register_subscriber(Registration::new("agent:heartbeat", Arc::new(HeartbeatHandler::new(registry))));
}

/// Waits for SIGINT (any platform) or SIGTERM (unix only).
async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = term.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
