// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Handler registration: the `(event-name -> handler, context, coalescing,
//! matcher)` tuple of §4.1.

use crate::coalesce::CoalesceOpts;
use async_trait::async_trait;
use bai_core::Event;
use std::sync::Arc;
use std::time::Duration;

/// A registered event handler. Receives one event normally, or a batch
/// when coalescing is configured (the batch is `[event]` when coalescing
/// is off, for a uniform call site).
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, events: &[Event]) -> Result<(), String>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&[Event]) -> Result<(), String> + Send + Sync,
{
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        self(events)
    }
}

pub type Matcher = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Notified on every handler failure, per §4.1 "Failure semantics": `(event
/// name, duration, exception)`. The bus still acknowledges the message.
pub trait FailureObserver: Send + Sync {
    fn on_failure(&self, event_name: &str, duration: Duration, error: &str);
}

pub struct Registration {
    pub event_name: &'static str,
    pub coalesce: Option<CoalesceOpts>,
    pub matcher: Option<Matcher>,
    pub handler: Arc<dyn EventHandler>,
}

impl Registration {
    pub fn new(event_name: &'static str, handler: Arc<dyn EventHandler>) -> Self {
        Self { event_name, coalesce: None, matcher: None, handler }
    }

    pub fn with_coalesce(mut self, opts: CoalesceOpts) -> Self {
        self.coalesce = Some(opts);
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if event.name() != self.event_name {
            return false;
        }
        match &self.matcher {
            Some(m) => m(event),
            None => true,
        }
    }
}
