// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! `rpc_context` (§4.2): a short-lived handle through which named
//! procedure calls are invoked against one agent, with an `order_key` that
//! serializes calls sharing the same key (e.g. all RPCs for one session
//! id run FIFO, per §4.4 "Per-session event ordering").

use bai_core::AgentId;
use bai_wire::{AgentRpc, RpcError, TransportError};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::AgentCache;

/// Per-order-key FIFO lock table. Calls sharing an `order_key` serialize
/// through the same `AsyncMutex`; calls with no `order_key` run unordered.
#[derive(Default)]
struct OrderLocks {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl OrderLocks {
    fn lock_for(&self, order_key: &str) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(order_key.to_string()).or_default().clone()
    }
}

/// Opens `rpc_context` handles against a shared transport and agent cache.
#[derive(Clone)]
pub struct RpcContextFactory {
    transport: Arc<dyn AgentRpc>,
    cache: AgentCache,
    order_locks: Arc<OrderLocks>,
}

impl RpcContextFactory {
    pub fn new(transport: Arc<dyn AgentRpc>, cache: AgentCache) -> Self {
        Self { transport, cache, order_locks: Arc::new(OrderLocks::default()) }
    }

    /// Validates the agent is in the cache (i.e. not LOST/TERMINATED) and
    /// returns a handle scoped to `agent_id`, `order_key`, and
    /// `invoke_timeout`.
    pub fn rpc_context(
        &self,
        agent_id: AgentId,
        order_key: Option<String>,
        invoke_timeout: Duration,
    ) -> Result<RpcContext, RpcError> {
        self.cache
            .lookup(&agent_id)
            .ok_or(RpcError::Transport(TransportError::NoRoute))?;
        let order_lock = order_key.as_deref().map(|k| self.order_locks.lock_for(k));
        Ok(RpcContext {
            transport: self.transport.clone(),
            agent_id,
            order_lock,
            invoke_timeout,
        })
    }
}

/// A scoped handle for invoking named agent RPCs. Every call acquires the
/// `order_key`'s FIFO lock (if any) before dispatching, and races the call
/// against `invoke_timeout`.
pub struct RpcContext {
    transport: Arc<dyn AgentRpc>,
    agent_id: AgentId,
    order_lock: Option<Arc<AsyncMutex<()>>>,
    invoke_timeout: Duration,
}

impl RpcContext {
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn transport(&self) -> &dyn AgentRpc {
        self.transport.as_ref()
    }

    /// Runs `call` (a closure invoking one `AgentRpc` method) under the
    /// `order_key` lock and the configured timeout. Callers pass a future
    /// already bound to the specific method they want to invoke.
    pub async fn invoke<T, F>(&self, call: F) -> Result<T, RpcError>
    where
        F: std::future::Future<Output = Result<T, RpcError>>,
    {
        let _guard = match &self.order_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        match tokio::time::timeout(self.invoke_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Transport(TransportError::Timeout(self.invoke_timeout))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeAgentRpc;
    use bai_wire::DEFAULT_READ_TIMEOUT;

    fn agent_id() -> AgentId {
        AgentId::from_string("agt-test0123456789abcd")
    }

    #[tokio::test]
    async fn missing_agent_yields_no_route() {
        let factory = RpcContextFactory::new(Arc::new(FakeAgentRpc::new()), AgentCache::new());
        let err = factory.rpc_context(agent_id(), None, DEFAULT_READ_TIMEOUT).unwrap_err();
        assert!(matches!(err, RpcError::Transport(TransportError::NoRoute)));
    }

    #[tokio::test]
    async fn known_agent_yields_context() {
        let cache = AgentCache::new();
        cache.update(agent_id(), "tcp://127.0.0.1:6001".into(), "key".into());
        let factory = RpcContextFactory::new(Arc::new(FakeAgentRpc::new()), cache);
        let ctx = factory.rpc_context(agent_id(), Some("sess-1".into()), DEFAULT_READ_TIMEOUT).unwrap();
        assert_eq!(ctx.agent_id(), &agent_id());
    }

    #[tokio::test]
    async fn same_order_key_serializes_calls() {
        let cache = AgentCache::new();
        cache.update(agent_id(), "tcp://127.0.0.1:6001".into(), "key".into());
        let factory = RpcContextFactory::new(Arc::new(FakeAgentRpc::new()), cache);
        let order = Arc::new(SyncMutex::new(Vec::new()));

        let ctx_a = factory.rpc_context(agent_id(), Some("sess-1".into()), DEFAULT_READ_TIMEOUT).unwrap();
        let ctx_b = factory.rpc_context(agent_id(), Some("sess-1".into()), DEFAULT_READ_TIMEOUT).unwrap();

        let order_a = order.clone();
        let fut_a = ctx_a.invoke(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            order_a.lock().push("a");
            Ok::<_, RpcError>(())
        });
        let order_b = order.clone();
        let fut_b = ctx_b.invoke(async move {
            order_b.lock().push("b");
            Ok::<_, RpcError>(())
        });

        let (_, _) = tokio::join!(fut_a, fut_b);
        assert_eq!(*order.lock(), vec!["a", "b"]);
    }
}
