// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Lifecycle events carried on the event bus (§3, §4.6, §6).
//!
//! Each variant is a dedicated schema rather than the source's tuple of
//! primitives; `#[serde(default)]` fields added after a variant's initial
//! release give the same length-based backward compatibility the source got
//! from accepting shorter tuples (§9).

mod dispatch;

use crate::agent::AgentId;
use crate::endpoint::RouteId;
use crate::image::ImageRef;
use crate::kernel::{KernelId, KernelPorts, ServicePort, SessionId};
use crate::resource::ResourceSlots;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use dispatch::CoalesceKey;

/// A lifecycle event. Values are immutable once published (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- scheduler ticks --
    #[serde(rename = "schedule:do_schedule")]
    DoScheduleEvent,

    // -- kernel lifecycle --
    #[serde(rename = "kernel:preparing")]
    KernelPreparing { kernel_id: KernelId, session_id: SessionId },
    #[serde(rename = "kernel:pulling")]
    KernelPulling { kernel_id: KernelId, session_id: SessionId, image: String },
    #[serde(rename = "kernel:creating")]
    KernelCreating { kernel_id: KernelId, session_id: SessionId },
    #[serde(rename = "kernel:started")]
    KernelStarted {
        kernel_id: KernelId,
        session_id: SessionId,
        container_id: String,
        actual_allocated_slots: ResourceSlots,
        service_ports: Vec<ServicePort>,
        #[serde(default)]
        ports: KernelPorts,
    },
    #[serde(rename = "kernel:cancelled")]
    KernelCancelled { kernel_id: KernelId, session_id: SessionId, reason: String },
    #[serde(rename = "kernel:terminating")]
    KernelTerminating { kernel_id: KernelId, session_id: SessionId, reason: String },
    #[serde(rename = "kernel:terminated")]
    KernelTerminated {
        kernel_id: KernelId,
        session_id: SessionId,
        reason: String,
        exit_code: Option<i32>,
    },

    // -- session lifecycle --
    #[serde(rename = "session:enqueued")]
    SessionEnqueued { session_id: SessionId, creation_id: String },
    #[serde(rename = "session:started")]
    SessionStarted { session_id: SessionId, creation_id: String },
    #[serde(rename = "session:cancelled")]
    SessionCancelled { session_id: SessionId, creation_id: String, reason: String },
    #[serde(rename = "session:terminating")]
    SessionTerminating { session_id: SessionId, reason: String },
    #[serde(rename = "session:terminated")]
    SessionTerminated { session_id: SessionId, reason: String },
    #[serde(rename = "session:do_terminate")]
    DoTerminateSession { session_id: SessionId, reason: String },

    // -- agent lifecycle --
    #[serde(rename = "agent:started")]
    AgentStarted { agent_id: AgentId, reason: String },
    #[serde(rename = "agent:terminated")]
    AgentTerminated { agent_id: AgentId, reason: String },
    #[serde(rename = "agent:heartbeat")]
    AgentHeartbeat {
        agent_id: AgentId,
        address: String,
        public_key: String,
        scaling_group: String,
        available_slots: ResourceSlots,
        architecture: String,
        version: String,
        #[serde(default)]
        images: Vec<String>,
    },
    #[serde(rename = "agent:error")]
    AgentError {
        agent_id: AgentId,
        message: String,
        #[serde(default)]
        traceback: Option<String>,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        context_env: BTreeMap<String, String>,
        severity: String,
    },

    // -- routing (inference) --
    #[serde(rename = "route:created")]
    RouteCreated { route_id: RouteId, endpoint_id: crate::endpoint::EndpointId },

    // -- logs --
    #[serde(rename = "kernel:do_sync_logs")]
    DoSyncKernelLogs { kernel_id: KernelId, container_id: String },

    // -- image pull, with backward-compatible optional structured ImageRef --
    #[serde(rename = "image:pull_started")]
    ImagePullStarted {
        agent_id: AgentId,
        image: String,
        #[serde(default)]
        image_ref: Option<ImageRef>,
        timestamp_epoch_ms: i64,
    },
    #[serde(rename = "image:pull_finished")]
    ImagePullFinished {
        agent_id: AgentId,
        image: String,
        #[serde(default)]
        image_ref: Option<ImageRef>,
    },
    #[serde(rename = "image:pull_failed")]
    ImagePullFailed {
        agent_id: AgentId,
        image: String,
        #[serde(default)]
        image_ref: Option<ImageRef>,
        msg: String,
    },

    // -- coalescing example event (§8 seed scenario 6) --
    #[serde(rename = "bgtask:updated")]
    BgtaskUpdated {
        task_id: uuid::Uuid,
        current: u64,
        total: u64,
        #[serde(default)]
        message: Option<String>,
    },

    /// Forward/backward compatibility: unrecognized event names deserialize
    /// here instead of failing the whole stream read.
    #[serde(other, skip_serializing)]
    Custom,
}

#[cfg(test)]
#[path = "../event_tests.rs"]
mod tests;
