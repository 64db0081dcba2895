// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! `LifecycleWaiterRegistry` (§9 "Global mutable state ... replaced by an
//! explicit `LifecycleWaiterRegistry`"): the thing `create_session`'s final
//! step blocks on until the session reaches RUNNING or a terminal status.
//!
//! Keyed by `SessionId` rather than the creation id carried on the wire —
//! the `CreationWaiter` seam `bai-engine::handlers` exposes only carries a
//! session id, so a second creation-id-keyed table would buy nothing.
//! Registration map style (`parking_lot::Mutex` over a plain map) follows
//! `bai_engine::updatable_set::UpdatableSet`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bai_core::SessionId;
use bai_engine::CreationWaiter;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationOutcome {
    Started,
    Cancelled { reason: String },
    /// `max_wait_seconds` elapsed; the enqueue itself is unaffected (§4.5
    /// step 8: "timeout does not cancel the enqueue").
    Timeout,
}

struct Waiter {
    notify: Notify,
    result: Mutex<Option<CreationOutcome>>,
}

#[derive(Default)]
pub struct LifecycleWaiterRegistry {
    waiters: Mutex<HashMap<SessionId, Arc<Waiter>>>,
}

impl LifecycleWaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `session_id` ahead of emitting the event that
    /// will eventually resolve it, so a `notify_started`/`notify_cancelled`
    /// that races ahead of `wait` still has an entry to land its permit on.
    pub fn register(&self, session_id: SessionId) {
        self.waiter_for(session_id);
    }

    fn waiter_for(&self, session_id: SessionId) -> Arc<Waiter> {
        self.waiters
            .lock()
            .entry(session_id)
            .or_insert_with(|| Arc::new(Waiter { notify: Notify::new(), result: Mutex::new(None) }))
            .clone()
    }

    /// Registers interest in `session_id` and blocks up to `timeout` for a
    /// terminal creation outcome. Safe to call even if `notify_started`/
    /// `notify_cancelled` races ahead of the wait: `Notify::notify_one`
    /// stores a permit when no one is waiting yet.
    pub async fn wait(&self, session_id: SessionId, timeout: Duration) -> CreationOutcome {
        let waiter = self.waiter_for(session_id);
        let outcome = match tokio::time::timeout(timeout, waiter.notify.notified()).await {
            Ok(()) => waiter.result.lock().clone().unwrap_or(CreationOutcome::Timeout),
            Err(_) => CreationOutcome::Timeout,
        };
        self.waiters.lock().remove(&session_id);
        outcome
    }
}

#[async_trait]
impl CreationWaiter for LifecycleWaiterRegistry {
    async fn notify_started(&self, session_id: SessionId) {
        if let Some(waiter) = self.waiters.lock().get(&session_id).cloned() {
            *waiter.result.lock() = Some(CreationOutcome::Started);
            waiter.notify.notify_one();
        }
    }

    async fn notify_cancelled(&self, session_id: SessionId, reason: String) {
        if let Some(waiter) = self.waiters.lock().get(&session_id).cloned() {
            *waiter.result.lock() = Some(CreationOutcome::Cancelled { reason });
            waiter.notify.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_times_out_with_no_notification() {
        let registry = LifecycleWaiterRegistry::new();
        let session_id = SessionId::new();
        let outcome = registry.wait(session_id, Duration::from_millis(20)).await;
        assert_eq!(outcome, CreationOutcome::Timeout);
    }

    #[tokio::test]
    async fn notify_started_before_wait_is_not_lost() {
        let registry = Arc::new(LifecycleWaiterRegistry::new());
        let session_id = SessionId::new();
        registry.waiter_for(session_id);
        registry.notify_started(session_id).await;
        let outcome = registry.wait(session_id, Duration::from_millis(200)).await;
        assert_eq!(outcome, CreationOutcome::Started);
    }

    #[tokio::test]
    async fn notify_cancelled_carries_reason() {
        let registry = Arc::new(LifecycleWaiterRegistry::new());
        let session_id = SessionId::new();
        let waiting = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait(session_id, Duration::from_secs(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.notify_cancelled(session_id, "image-pull-failed".into()).await;
        let outcome = waiting.await.unwrap();
        assert_eq!(outcome, CreationOutcome::Cancelled { reason: "image-pull-failed".into() });
    }
}
