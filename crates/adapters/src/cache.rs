// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The Agent Cache (§4.2): a process-local map from agent identity to its
//! last-known network address and public key, kept current by heartbeat
//! and invalidated on LOST/TERMINATED.

use bai_core::AgentId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// An agent's last-known reachability info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub address: String,
    pub public_key: String,
}

/// Shared, cloneable handle onto the process-local agent address table.
#[derive(Clone, Default)]
pub struct AgentCache {
    inner: Arc<RwLock<HashMap<AgentId, AgentEndpoint>>>,
}

impl AgentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on every heartbeat (§4.6 `handle_heartbeat`): refreshes or
    /// inserts the agent's address.
    pub fn update(&self, agent_id: AgentId, address: String, public_key: String) {
        self.inner.write().insert(agent_id, AgentEndpoint { address, public_key });
    }

    /// Called when an agent transitions to LOST or TERMINATED; subsequent
    /// `rpc_context` calls for this agent fail with `NoRoute` until the
    /// agent heartbeats again.
    pub fn invalidate(&self, agent_id: &AgentId) {
        self.inner.write().remove(agent_id);
    }

    pub fn lookup(&self, agent_id: &AgentId) -> Option<AgentEndpoint> {
        self.inner.read().get(agent_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_id() -> AgentId {
        AgentId::from_string("agt-test0123456789abcd")
    }

    #[test]
    fn update_then_lookup_returns_current_endpoint() {
        let cache = AgentCache::new();
        cache.update(agent_id(), "tcp://10.0.0.1:6001".into(), "key-a".into());
        let endpoint = cache.lookup(&agent_id()).unwrap();
        assert_eq!(endpoint.address, "tcp://10.0.0.1:6001");
        assert_eq!(endpoint.public_key, "key-a");
    }

    #[test]
    fn update_overwrites_prior_endpoint() {
        let cache = AgentCache::new();
        cache.update(agent_id(), "tcp://10.0.0.1:6001".into(), "key-a".into());
        cache.update(agent_id(), "tcp://10.0.0.2:6001".into(), "key-b".into());
        let endpoint = cache.lookup(&agent_id()).unwrap();
        assert_eq!(endpoint.address, "tcp://10.0.0.2:6001");
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = AgentCache::new();
        cache.update(agent_id(), "tcp://10.0.0.1:6001".into(), "key-a".into());
        cache.invalidate(&agent_id());
        assert!(cache.lookup(&agent_id()).is_none());
    }

    #[test]
    fn lookup_missing_agent_returns_none() {
        let cache = AgentCache::new();
        assert!(cache.lookup(&agent_id()).is_none());
    }
}
