// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The unit of scheduling and user intent (§3 Session).

use crate::image::ImageRef;
use crate::kernel::SessionId;
use crate::owner::{AccessKey, DomainName, ProjectName};
use crate::resource::ResourceSlots;
use crate::status::{StatusHistory, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    Interactive,
    Batch,
    Inference,
    System,
}

crate::simple_display! {
    SessionType {
        Interactive => "INTERACTIVE",
        Batch => "BATCH",
        Inference => "INFERENCE",
        System => "SYSTEM",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterMode {
    SingleNode,
    MultiNode,
}

crate::simple_display! {
    ClusterMode {
        SingleNode => "SINGLE_NODE",
        MultiNode => "MULTI_NODE",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    Host,
    Volatile,
    Persistent,
}

crate::simple_display! {
    NetworkType {
        Host => "HOST",
        Volatile => "VOLATILE",
        Persistent => "PERSISTENT",
    }
}

/// A single vfolder mount request; the core carries only identifier and
/// mount options, per the glossary ("the core only carries its identifier
/// and mount options").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VFolderMount {
    pub vfolder_id: uuid::Uuid,
    pub mount_path: String,
    pub alias: Option<String>,
    pub read_only: bool,
}

/// A session: the unit of scheduling and user intent (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub access_key: AccessKey,
    pub domain: DomainName,
    pub project: ProjectName,
    pub scaling_group: Option<String>,
    pub session_type: SessionType,
    pub cluster_mode: ClusterMode,
    pub cluster_size: u32,
    pub priority: i32,
    pub status: Status,
    #[serde(default)]
    pub status_history: StatusHistory,
    /// Ordered, main kernel's image first (§3: "images (ordered, main first)").
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub vfolder_mounts: Vec<VFolderMount>,
    #[serde(default)]
    pub environ: BTreeMap<String, String>,
    pub requested_slots: ResourceSlots,
    pub occupied_slots: ResourceSlots,
    pub starts_at_epoch_ms: Option<i64>,
    pub batch_timeout_secs: Option<u64>,
    pub callback_url: Option<String>,
    pub network_type: NetworkType,
    pub network_id: Option<String>,
    /// The correlation id handed back to the caller in `SessionEnqueuedEvent`
    /// and reused verbatim on the `SessionStartedEvent` a later restart
    /// emits (§4.5 `create_session`/`restart_session`).
    #[serde(default)]
    pub creation_id: Option<String>,
}

impl Session {
    /// Invariant: `session.cluster_size == |kernels|` (§3). Callers that
    /// hold the kernel list verify this at persistence time; exposed here
    /// so it reads the same way at every call site.
    pub fn cluster_size_matches(&self, kernel_count: usize) -> bool {
        self.cluster_size as usize == kernel_count
    }

    pub fn main_image(&self) -> Option<&ImageRef> {
        self.images.first()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
