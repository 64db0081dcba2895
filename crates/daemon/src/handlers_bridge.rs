// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! `Registry` commands that the event-handler table (§4.6) names but that
//! live on `Registry` itself rather than as a standalone
//! `bai_eventbus::EventHandler` in `bai-engine` (`handle_heartbeat` takes
//! explicit parameters rather than an `Event`, since it's also the target
//! of a direct RPC call per §4.5). This bridges the `AgentHeartbeat`
//! subscription to that call.

use std::sync::Arc;

use async_trait::async_trait;
use bai_core::{Event, SystemClock};
use bai_eventbus::EventBus;
use bai_eventbus::EventHandler;
use bai_registry::Registry;
use tracing::warn;

pub struct HeartbeatHandler {
    registry: Arc<Registry<SystemClock, EventBus>>,
}

impl HeartbeatHandler {
    pub fn new(registry: Arc<Registry<SystemClock, EventBus>>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventHandler for HeartbeatHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        for event in events {
            let Event::AgentHeartbeat {
                agent_id,
                address,
                public_key,
                scaling_group,
                available_slots,
                architecture,
                version,
                images,
            } = event
            else {
                continue;
            };
            if let Err(err) = self
                .registry
                .handle_heartbeat(*agent_id, address, public_key, scaling_group, available_slots, architecture, version, images)
                .await
            {
                warn!(agent_id = %agent_id, error = %err, "handle_heartbeat failed");
            }
        }
        Ok(())
    }
}
