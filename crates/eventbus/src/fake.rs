// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! An in-memory fake event bus for engine/registry tests — no Redis, no
//! consumer groups, just a synchronous fan-out to every registered handler
//! whose matcher accepts the event. Coalescing is honored via the same
//! [`Coalescer`] used by the real bus.

use crate::coalesce::Coalescer;
use crate::handler::Registration;
use bai_core::Event;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct FakeEventBus {
    registrations: Mutex<Vec<Registration>>,
    published: Mutex<Vec<Event>>,
    coalescers: Mutex<HashMap<usize, Coalescer>>,
}

impl FakeEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registration: Registration) {
        self.registrations.lock().push(registration);
    }

    /// Synchronously delivers `event` to every matching handler, honoring
    /// coalescing in-process (a coalesced handler only fires once its
    /// batch is full; tests that need the `max_wait` path should call
    /// [`FakeEventBus::flush_coalesced`]).
    pub async fn publish(&self, event: Event, _source: &str) {
        self.published.lock().push(event.clone());
        let ready_batches = {
            let registrations = self.registrations.lock();
            let mut coalescers = self.coalescers.lock();
            let mut ready = Vec::new();
            for (idx, reg) in registrations.iter().enumerate() {
                if !reg.matches(&event) {
                    continue;
                }
                match reg.coalesce {
                    Some(opts) => {
                        let coalescer = coalescers.entry(idx).or_insert_with(|| Coalescer::new(opts));
                        if let Some(batch) = coalescer.push(reg.event_name.to_string(), event.clone()) {
                            ready.push((idx, batch));
                        }
                    }
                    None => ready.push((idx, vec![event.clone()])),
                }
            }
            ready
        };
        for (idx, batch) in ready_batches {
            let handler = {
                let registrations = self.registrations.lock();
                registrations[idx].handler.clone()
            };
            let _ = handler.handle(&batch).await;
        }
    }

    /// Forces every pending coalesced batch to fire, regardless of size —
    /// simulates `max_wait` elapsing (§8 seed scenario 6).
    pub async fn flush_coalesced(&self) {
        let ready_batches: Vec<(usize, Vec<Event>)> = {
            let mut coalescers = self.coalescers.lock();
            let mut out = Vec::new();
            for (idx, coalescer) in coalescers.iter_mut() {
                for (_key, batch) in coalescer.force_drain() {
                    out.push((*idx, batch));
                }
            }
            out
        };
        for (idx, batch) in ready_batches {
            let handler = {
                let registrations = self.registrations.lock();
                registrations[idx].handler.clone()
            };
            let _ = handler.handle(&batch).await;
        }
    }

    pub fn published_events(&self) -> Vec<Event> {
        self.published.lock().clone()
    }
}

pub type SharedFakeEventBus = Arc<FakeEventBus>;

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
