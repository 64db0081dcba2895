// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The trait seam between registry commands and the event bus.
//!
//! `bai_eventbus::EventBus::produce_event` and
//! `bai_eventbus::fake::FakeEventBus::publish` have different signatures
//! (the real bus returns the stream entry id and a fallible `Result`; the
//! fake is fire-and-forget for test convenience), so registry code is
//! written against this trait instead of either concrete type — the same
//! inversion `bai-engine::handlers` already uses for `CreationWaiter` and
//! `SessionDestroyer`.

use async_trait::async_trait;
use bai_core::{Event, RegistryError};
use bai_eventbus::EventBus;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: Event, source: &str) -> Result<(), RegistryError>;
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: Event, source: &str) -> Result<(), RegistryError> {
        self.produce_event(&event, source)
            .await
            .map(|_stream_id| ())
            .map_err(|e| RegistryError::IntegrityError(e.to_string()))
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl EventPublisher for bai_eventbus::fake::FakeEventBus {
    async fn publish(&self, event: Event, source: &str) -> Result<(), RegistryError> {
        bai_eventbus::fake::FakeEventBus::publish(self, event, source).await;
        Ok(())
    }
}
