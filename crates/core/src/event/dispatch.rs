// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Per-event name, log summary, and correlation-id accessors, plus the
//! coalescing key extractor (§4.1, SPEC_FULL supplemented feature 1).

use super::Event;
use crate::agent::AgentId;
use crate::kernel::{KernelId, SessionId};

impl Event {
    /// The wire `name`, matching the `#[serde(rename = "...")]` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Event::DoScheduleEvent => "schedule:do_schedule",
            Event::KernelPreparing { .. } => "kernel:preparing",
            Event::KernelPulling { .. } => "kernel:pulling",
            Event::KernelCreating { .. } => "kernel:creating",
            Event::KernelStarted { .. } => "kernel:started",
            Event::KernelCancelled { .. } => "kernel:cancelled",
            Event::KernelTerminating { .. } => "kernel:terminating",
            Event::KernelTerminated { .. } => "kernel:terminated",
            Event::SessionEnqueued { .. } => "session:enqueued",
            Event::SessionStarted { .. } => "session:started",
            Event::SessionCancelled { .. } => "session:cancelled",
            Event::SessionTerminating { .. } => "session:terminating",
            Event::SessionTerminated { .. } => "session:terminated",
            Event::DoTerminateSession { .. } => "session:do_terminate",
            Event::AgentStarted { .. } => "agent:started",
            Event::AgentTerminated { .. } => "agent:terminated",
            Event::AgentHeartbeat { .. } => "agent:heartbeat",
            Event::AgentError { .. } => "agent:error",
            Event::RouteCreated { .. } => "route:created",
            Event::DoSyncKernelLogs { .. } => "kernel:do_sync_logs",
            Event::ImagePullStarted { .. } => "image:pull_started",
            Event::ImagePullFinished { .. } => "image:pull_finished",
            Event::ImagePullFailed { .. } => "image:pull_failed",
            Event::BgtaskUpdated { .. } => "bgtask:updated",
            Event::Custom => "custom",
        }
    }

    /// A short human-readable summary for structured log lines.
    pub fn log_summary(&self) -> String {
        match self {
            Event::KernelStarted { kernel_id, container_id, .. } => {
                format!("kernel {kernel_id} started as container {container_id}")
            }
            Event::KernelTerminated { kernel_id, reason, .. } => {
                format!("kernel {kernel_id} terminated ({reason})")
            }
            Event::SessionTerminated { session_id, reason, .. } => {
                format!("session {session_id} terminated ({reason})")
            }
            Event::ImagePullFailed { agent_id, image, msg, .. } => {
                format!("image pull of {image} on {agent_id} failed: {msg}")
            }
            Event::AgentError { agent_id, message, .. } => {
                format!("agent {agent_id} reported error: {message}")
            }
            other => other.name().to_string(),
        }
    }

    /// The session this event concerns, if any — used to register a
    /// session into the updatable set (§4.3).
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Event::KernelPreparing { session_id, .. }
            | Event::KernelPulling { session_id, .. }
            | Event::KernelCreating { session_id, .. }
            | Event::KernelStarted { session_id, .. }
            | Event::KernelCancelled { session_id, .. }
            | Event::KernelTerminating { session_id, .. }
            | Event::KernelTerminated { session_id, .. }
            | Event::SessionEnqueued { session_id, .. }
            | Event::SessionStarted { session_id, .. }
            | Event::SessionCancelled { session_id, .. }
            | Event::SessionTerminating { session_id, .. }
            | Event::SessionTerminated { session_id, .. }
            | Event::DoTerminateSession { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    pub fn kernel_id(&self) -> Option<KernelId> {
        match self {
            Event::KernelPreparing { kernel_id, .. }
            | Event::KernelPulling { kernel_id, .. }
            | Event::KernelCreating { kernel_id, .. }
            | Event::KernelStarted { kernel_id, .. }
            | Event::KernelCancelled { kernel_id, .. }
            | Event::KernelTerminating { kernel_id, .. }
            | Event::KernelTerminated { kernel_id, .. }
            | Event::DoSyncKernelLogs { kernel_id, .. } => Some(*kernel_id),
            _ => None,
        }
    }

    pub fn agent_id(&self) -> Option<AgentId> {
        match self {
            Event::AgentStarted { agent_id, .. }
            | Event::AgentTerminated { agent_id, .. }
            | Event::AgentHeartbeat { agent_id, .. }
            | Event::AgentError { agent_id, .. }
            | Event::ImagePullStarted { agent_id, .. }
            | Event::ImagePullFinished { agent_id, .. }
            | Event::ImagePullFailed { agent_id, .. } => Some(*agent_id),
            _ => None,
        }
    }
}

/// Extracts a coalescing key from an event: events sharing `(name, key)`
/// are batched together by the event bus (§4.1, SPEC_FULL supplemented
/// feature 1). `None` disables coalescing for that instance.
pub type CoalesceKey = fn(&Event) -> Option<String>;

/// The default key extractor for `bgtask:updated`: coalesce per task id.
pub fn bgtask_coalesce_key(event: &Event) -> Option<String> {
    match event {
        Event::BgtaskUpdated { task_id, .. } => Some(task_id.to_string()),
        _ => None,
    }
}

/// The default key extractor for image-pull events: coalesce per
/// `(agent, image)` pull key.
pub fn image_pull_coalesce_key(event: &Event) -> Option<String> {
    match event {
        Event::ImagePullStarted { agent_id, image, .. }
        | Event::ImagePullFinished { agent_id, image, .. }
        | Event::ImagePullFailed { agent_id, image, .. } => Some(format!("{agent_id}:{image}")),
        _ => None,
    }
}
