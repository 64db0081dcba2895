// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! A single container belonging to a session.

use crate::agent::AgentId;
use crate::image::ImageRef;
use crate::resource::ResourceSlots;
use crate::status::{StatusHistory, Status};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies a single container (one per kernel, many per session).
    pub struct KernelId("kern");
}

crate::define_id! {
    /// Identifies the session a kernel belongs to.
    pub struct SessionId("sess");
}

/// A kernel's position within its session's cluster topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterRole {
    Main,
    Sub,
}

crate::simple_display! {
    ClusterRole {
        Main => "main",
        Sub => "sub",
    }
}

/// A service port exposed by a running kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub protocol: String,
    pub container_port: u16,
    pub host_port: Option<u16>,
}

/// Per-kernel wire ports allocated on kernel creation (§6 `create_kernels`
/// response shape).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelPorts {
    pub repl_in_port: Option<u16>,
    pub repl_out_port: Option<u16>,
    pub stdin_port: Option<u16>,
    pub stdout_port: Option<u16>,
}

/// The error half of [`StatusData`] (§9 supplemented feature 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub repr: String,
}

/// Structured detail attached to a failure transition, e.g. an image pull
/// failure (§4.4, §8 scenario 2). Mirrors the original's
/// `status_data = {"error": {"repr": msg}}` shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusData {
    pub error: Option<ErrorDetail>,
}

impl StatusData {
    pub fn error_repr(msg: impl Into<String>) -> Self {
        StatusData { error: Some(ErrorDetail { repr: msg.into() }) }
    }
}

/// A single container (§3 Kernel).
///
/// Exactly one kernel per session carries `cluster_role == Main` — enforced
/// at the application layer here and mirrored by a DB partial unique index
/// in the storage layer (§9 Open Question c).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kernel {
    pub id: KernelId,
    pub session_id: SessionId,
    pub cluster_role: ClusterRole,
    pub cluster_idx: u32,
    pub agent_id: Option<AgentId>,
    pub image: ImageRef,
    pub requested_slots: ResourceSlots,
    pub occupied_slots: ResourceSlots,
    pub status: Status,
    #[serde(default)]
    pub status_history: StatusHistory,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub service_ports: Vec<ServicePort>,
    pub container_id: Option<String>,
    #[serde(default)]
    pub ports: KernelPorts,
    pub startup_command: Option<String>,
    pub bootstrap_script: Option<String>,
    /// Short reason for the current/last status, e.g. `"image-pull-failed"`.
    #[serde(default)]
    pub status_info: Option<String>,
    #[serde(default)]
    pub status_data: Option<StatusData>,
}

impl Kernel {
    pub fn is_main(&self) -> bool {
        self.cluster_role == ClusterRole::Main
    }

    /// Record a status transition and its history entry. Callers are
    /// responsible for checking [`Status::can_transition_to`] first; this
    /// only performs the mutation (kept separate so FSM callers can log the
    /// attempted-but-illegal case instead of silently no-op'ing).
    pub fn apply_transition(&mut self, next: Status, now_epoch_ms: i64) {
        self.status = next;
        crate::status::record_transition(&mut self.status_history, next, now_epoch_ms);
    }
}

/// Sort key for kernel lists per §4.4 "Tie-breaks & ordering":
/// `(cluster_role == main desc, cluster_idx asc)`.
pub fn kernel_sort_key(k: &Kernel) -> (std::cmp::Reverse<bool>, u32) {
    (std::cmp::Reverse(k.is_main()), k.cluster_idx)
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;
