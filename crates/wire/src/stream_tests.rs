// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;
use bai_core::{KernelId, SessionId};

#[test]
fn encode_then_decode_is_identity() {
    let event = Event::KernelPulling { kernel_id: KernelId::new(), session_id: SessionId::new(), image: "python:3.9".into() };
    let bytes = encode_stream_entry(&event, "manager").unwrap();
    let decoded = decode_stream_entry(&bytes).unwrap();
    assert_eq!(decoded.name, "kernel:pulling");
    assert_eq!(decoded.source, "manager");
}

#[test]
fn truncated_length_prefix_is_an_error() {
    let err = decode_stream_entry(&[0, 0]);
    assert!(err.is_err());
}

#[test]
fn truncated_payload_is_an_error() {
    let mut buf = 100u32.to_be_bytes().to_vec();
    buf.extend_from_slice(b"short");
    let err = decode_stream_entry(&buf);
    assert!(err.is_err());
}
