// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Agent identity and liveness status.

use crate::resource::ResourceSlots;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies an agent node.
    pub struct AgentId("agt-");
}

/// Agent liveness status (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    Alive,
    Lost,
    Restarting,
    Terminated,
}

crate::simple_display! {
    AgentStatus {
        Alive => "ALIVE",
        Lost => "LOST",
        Restarting => "RESTARTING",
        Terminated => "TERMINATED",
    }
}

/// An agent node: identity, address, and the resource envelope it reports.
///
/// Invariant: `occupied_slots <= available_slots` per slot. Status
/// transitions only via heartbeat or liveness timeout (never a direct
/// admin edit), enforced by [`crate::agent_transitions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub address: String,
    pub public_key: String,
    pub scaling_group: String,
    pub status: AgentStatus,
    pub available_slots: ResourceSlots,
    pub occupied_slots: ResourceSlots,
    pub architecture: String,
    pub version: String,
    pub last_seen_epoch_ms: i64,
    /// Set when transitioning to LOST; cleared on revival.
    pub lost_at_epoch_ms: Option<i64>,
    /// Canonical image names this agent has reported having cached.
    #[serde(default)]
    pub cached_images: Vec<String>,
}

impl Agent {
    /// `available - occupied`, per slot, used by agent selection (§4.4).
    pub fn free_slots(&self) -> ResourceSlots {
        &self.available_slots - &self.occupied_slots
    }

    pub fn can_fit(&self, requested: &ResourceSlots) -> bool {
        self.status == AgentStatus::Alive && requested.le_elementwise(&self.free_slots())
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Agent {
    pub fn builder(id: AgentId) -> AgentBuilder {
        AgentBuilder::new(id)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct AgentBuilder {
    id: AgentId,
    address: String,
    public_key: String,
    scaling_group: String,
    status: AgentStatus,
    available_slots: ResourceSlots,
    occupied_slots: ResourceSlots,
    architecture: String,
    version: String,
    last_seen_epoch_ms: i64,
}

#[cfg(any(test, feature = "test-support"))]
impl AgentBuilder {
    fn new(id: AgentId) -> Self {
        Self {
            id,
            address: "tcp://127.0.0.1:6001".into(),
            public_key: "testkey".into(),
            scaling_group: "default".into(),
            status: AgentStatus::Alive,
            available_slots: ResourceSlots::new(),
            occupied_slots: ResourceSlots::new(),
            architecture: "x86_64".into(),
            version: "24.03".into(),
            last_seen_epoch_ms: 0,
        }
    }

    crate::setters! {
        into { address: String, public_key: String, scaling_group: String, architecture: String, version: String }
        set { status: AgentStatus, available_slots: ResourceSlots, occupied_slots: ResourceSlots, last_seen_epoch_ms: i64 }
    }

    pub fn build(self) -> Agent {
        Agent {
            id: self.id,
            address: self.address,
            public_key: self.public_key,
            scaling_group: self.scaling_group,
            status: self.status,
            available_slots: self.available_slots,
            occupied_slots: self.occupied_slots,
            architecture: self.architecture,
            version: self.version,
            last_seen_epoch_ms: self.last_seen_epoch_ms,
            lost_at_epoch_ms: None,
            cached_images: Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
