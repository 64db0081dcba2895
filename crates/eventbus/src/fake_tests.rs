// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;
use crate::handler::Registration;
use bai_core::KernelId;
use parking_lot::Mutex as PMutex;
use std::time::Duration;

struct CountingHandler {
    invocations: Arc<PMutex<Vec<usize>>>,
}

#[async_trait::async_trait]
impl crate::handler::EventHandler for CountingHandler {
    async fn handle(&self, events: &[Event]) -> Result<(), String> {
        self.invocations.lock().push(events.len());
        Ok(())
    }
}

#[tokio::test]
async fn coalesced_handler_batches_events_by_max_batch_size() {
    let bus = FakeEventBus::new();
    let invocations = Arc::new(PMutex::new(Vec::new()));
    let handler = Arc::new(CountingHandler { invocations: invocations.clone() });
    bus.register(
        Registration::new("bgtask:updated", handler)
            .with_coalesce(crate::coalesce::CoalesceOpts { max_wait: Duration::from_millis(200), max_batch_size: 5 }),
    );

    let task_id = uuid::Uuid::new_v4();
    for i in 0..7u64 {
        bus.publish(Event::BgtaskUpdated { task_id, current: i, total: 7, message: None }, "manager").await;
    }
    // 5 arrived immediately -> one batch of 5; 2 remain pending.
    assert_eq!(invocations.lock().clone(), vec![5]);

    bus.flush_coalesced().await;
    // the remaining 2 flush as a partial batch once max_wait "elapses".
    assert_eq!(invocations.lock().clone(), vec![5, 2]);
}

#[tokio::test]
async fn non_coalesced_handler_fires_once_per_event() {
    let bus = FakeEventBus::new();
    let invocations = Arc::new(PMutex::new(Vec::new()));
    let handler = Arc::new(CountingHandler { invocations: invocations.clone() });
    bus.register(Registration::new("kernel:pulling", handler));

    for _ in 0..3 {
        bus.publish(
            Event::KernelPulling {
                kernel_id: KernelId::new(),
                session_id: bai_core::SessionId::new(),
                image: "python:3.9".into(),
            },
            "manager",
        )
        .await;
    }
    assert_eq!(invocations.lock().len(), 3);
}

#[tokio::test]
async fn matcher_filters_out_non_matching_events() {
    let bus = FakeEventBus::new();
    let invocations = Arc::new(PMutex::new(Vec::new()));
    let handler = Arc::new(CountingHandler { invocations: invocations.clone() });
    bus.register(
        Registration::new("kernel:terminated", handler)
            .with_matcher(Arc::new(|e| matches!(e, Event::KernelTerminated { reason, .. } if reason == "AGENT_TERMINATION"))),
    );

    bus.publish(
        Event::KernelTerminated {
            kernel_id: KernelId::new(),
            session_id: bai_core::SessionId::new(),
            reason: "TASK_FINISHED".into(),
            exit_code: Some(0),
        },
        "manager",
    )
    .await;
    assert!(invocations.lock().is_empty());

    bus.publish(
        Event::KernelTerminated {
            kernel_id: KernelId::new(),
            session_id: bai_core::SessionId::new(),
            reason: "AGENT_TERMINATION".into(),
            exit_code: None,
        },
        "manager",
    )
    .await;
    assert_eq!(invocations.lock().len(), 1);
}
