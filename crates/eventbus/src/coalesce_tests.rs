// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;
use bai_core::{KernelId, SessionId};
use std::time::Duration;

fn sample_event() -> Event {
    Event::KernelPulling { kernel_id: KernelId::new(), session_id: SessionId::new(), image: "x".into() }
}

#[test]
fn batch_is_emitted_once_max_batch_size_is_reached() {
    let mut c = Coalescer::new(CoalesceOpts { max_wait: Duration::from_secs(60), max_batch_size: 3 });
    assert!(c.push("k".into(), sample_event()).is_none());
    assert!(c.push("k".into(), sample_event()).is_none());
    let batch = c.push("k".into(), sample_event());
    assert_eq!(batch.unwrap().len(), 3);
    assert!(c.is_empty());
}

#[test]
fn distinct_keys_buffer_independently() {
    let mut c = Coalescer::new(CoalesceOpts { max_wait: Duration::from_secs(60), max_batch_size: 2 });
    assert!(c.push("a".into(), sample_event()).is_none());
    assert!(c.push("b".into(), sample_event()).is_none());
    assert!(!c.is_empty());
    let a = c.push("a".into(), sample_event());
    assert_eq!(a.unwrap().len(), 2);
    // "b" still pending with 1 event
    assert!(!c.is_empty());
}

#[tokio::test]
async fn max_wait_expiry_flushes_a_partial_batch() {
    let mut c = Coalescer::new(CoalesceOpts { max_wait: Duration::from_millis(20), max_batch_size: 100 });
    c.push("k".into(), sample_event());
    c.push("k".into(), sample_event());
    let (key, events) = c.next_expired().await.expect("batch should expire");
    assert_eq!(key, "k");
    assert_eq!(events.len(), 2);
}
