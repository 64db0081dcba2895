// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;
use crate::agent::AgentId;
use crate::kernel::{KernelId, SessionId};

#[test]
fn serialize_then_deserialize_is_identity() {
    let event = Event::KernelTerminated {
        kernel_id: KernelId::new(),
        session_id: SessionId::new(),
        reason: "TASK_FINISHED".into(),
        exit_code: Some(0),
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(event.name(), back.name());
    assert_eq!(event.session_id(), back.session_id());
}

#[test]
fn unknown_event_name_deserializes_to_custom() {
    let json = r#"{"type":"legacy:something","foo":1}"#;
    let event: Event = serde_json::from_str(json).unwrap();
    assert!(matches!(event, Event::Custom));
}

#[test]
fn image_pull_event_without_image_ref_still_deserializes() {
    // Backward compatibility: older producers omit the structured image_ref.
    let json = r#"{"type":"image:pull_started","agent_id":"agt-0123456789abcdefghi","image":"python:3.9","timestamp_epoch_ms":1000}"#;
    let event: Event = serde_json::from_str(json).unwrap();
    match event {
        Event::ImagePullStarted { image_ref, image, .. } => {
            assert_eq!(image_ref, None);
            assert_eq!(image, "python:3.9");
        }
        _ => panic!("expected ImagePullStarted"),
    }
}

#[test]
fn session_id_accessor_extracts_from_kernel_events() {
    let session_id = SessionId::new();
    let event = Event::KernelPulling { kernel_id: KernelId::new(), session_id, image: "x".into() };
    assert_eq!(event.session_id(), Some(session_id));
}

#[test]
fn agent_id_accessor_extracts_from_heartbeat() {
    let agent_id = AgentId::new();
    let event = Event::AgentHeartbeat {
        agent_id,
        address: "tcp://a".into(),
        public_key: "k".into(),
        scaling_group: "default".into(),
        available_slots: crate::resource::ResourceSlots::new(),
        architecture: "x86_64".into(),
        version: "24.03".into(),
        images: Vec::new(),
    };
    assert_eq!(event.agent_id(), Some(agent_id));
}

#[test]
fn bgtask_coalesce_key_groups_by_task_id() {
    let id = uuid::Uuid::new_v4();
    let a = Event::BgtaskUpdated { task_id: id, current: 1, total: 10, message: None };
    let b = Event::BgtaskUpdated { task_id: id, current: 2, total: 10, message: None };
    assert_eq!(dispatch::bgtask_coalesce_key(&a), dispatch::bgtask_coalesce_key(&b));
}
