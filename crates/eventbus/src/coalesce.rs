// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Per-handler event coalescing (§4.1, SPEC_FULL supplemented feature 1):
//! a handler registered with `{max_wait, max_batch_size}` is invoked when
//! either bound is reached, batched per `(event name, coalesce key)`.

use bai_core::Event;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::time::delay_queue::Key as DelayKey;
use tokio_util::time::DelayQueue;

#[derive(Debug, Clone, Copy)]
pub struct CoalesceOpts {
    pub max_wait: Duration,
    pub max_batch_size: usize,
}

struct PendingBatch {
    events: Vec<Event>,
    delay_key: DelayKey,
}

/// Buffers events per coalescing key and yields a batch either when
/// `max_batch_size` is reached (via [`Coalescer::push`]) or when
/// `max_wait` elapses since the first event in that batch (via
/// [`Coalescer::next_expired`]).
pub struct Coalescer {
    opts: CoalesceOpts,
    pending: HashMap<String, PendingBatch>,
    timers: DelayQueue<String>,
}

impl Coalescer {
    pub fn new(opts: CoalesceOpts) -> Self {
        Self { opts, pending: HashMap::new(), timers: DelayQueue::new() }
    }

    /// Buffer `event` under `key`; returns a ready batch if `max_batch_size`
    /// was reached.
    pub fn push(&mut self, key: String, event: Event) -> Option<Vec<Event>> {
        if let Some(batch) = self.pending.get_mut(&key) {
            batch.events.push(event);
            if batch.events.len() >= self.opts.max_batch_size {
                return self.take(&key);
            }
            return None;
        }
        let delay_key = self.timers.insert(key.clone(), self.opts.max_wait);
        self.pending.insert(key, PendingBatch { events: vec![event], delay_key });
        None
    }

    fn take(&mut self, key: &str) -> Option<Vec<Event>> {
        let batch = self.pending.remove(key)?;
        self.timers.remove(&batch.delay_key);
        Some(batch.events)
    }

    /// Waits for the next batch whose `max_wait` has elapsed. Cancel-safe:
    /// intended to be polled in a `select!` alongside new-event intake.
    pub async fn next_expired(&mut self) -> Option<(String, Vec<Event>)> {
        let expired = self.timers.next().await?;
        let key = expired.into_inner();
        self.pending.remove(&key).map(|batch| (key, batch.events))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forces every pending batch to flush regardless of size or elapsed
    /// wait — used by test fakes to simulate `max_wait` elapsing.
    pub fn force_drain(&mut self) -> Vec<(String, Vec<Event>)> {
        let keys: Vec<String> = self.pending.keys().cloned().collect();
        keys.into_iter().filter_map(|k| self.take(&k).map(|batch| (k, batch))).collect()
    }
}

#[cfg(test)]
#[path = "coalesce_tests.rs"]
mod tests;
