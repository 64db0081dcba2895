// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The scheduler tick loop: on each interval, drive every PENDING session
//! through `schedule_session`/`start_image_pulls` and every PREPARED
//! session through `try_create_kernels` (§4.4), then drain the
//! status-updatable set and publish whatever `SessionX` events that
//! aggregation produced (§4.3). Nothing else in the workspace calls
//! `drain_and_recompute` — this loop is its only driver, per its own doc
//! comment ("meant to be called by the daemon on a short fixed interval").

use std::sync::Arc;
use std::time::Duration;

use bai_core::{Clock, Status};
use bai_engine::{drain_and_recompute, Scheduler, UpdatableSet};
use bai_eventbus::EventBus;
use bai_storage::SessionRepo;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[allow(clippy::too_many_arguments)]
pub async fn run<C: Clock>(
    scheduler: Scheduler<C>,
    sessions: SessionRepo,
    pool: PgPool,
    updatable: Arc<UpdatableSet>,
    bus: EventBus,
    clock: C,
    tick: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        let pending = match sessions.list_pending().await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(error = %err, "failed to list pending sessions");
                continue;
            }
        };
        for session in pending {
            if let Err(err) = scheduler.schedule_session(session.id).await {
                warn!(session_id = %session.id, error = %err, "schedule_session failed");
                continue;
            }
            if let Err(err) = scheduler.start_image_pulls(session.id).await {
                warn!(session_id = %session.id, error = %err, "start_image_pulls failed");
            }
        }

        let prepared = match sessions.list_by_status(Status::Prepared).await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(error = %err, "failed to list prepared sessions");
                continue;
            }
        };
        for session in prepared {
            if let Err(err) = scheduler.try_create_kernels(&session).await {
                warn!(session_id = %session.id, error = %err, "try_create_kernels failed");
            }
        }

        match drain_and_recompute(&pool, &updatable, &sessions, &clock).await {
            Ok(events) => {
                for event in events {
                    if let Err(err) = bus.produce_event(&event, "manager").await {
                        warn!(error = %err, "failed to publish session lifecycle event");
                    }
                }
            }
            Err(err) => warn!(error = %err, "drain_and_recompute failed"),
        }
    }
}
