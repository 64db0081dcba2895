// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Property test for the wire round-trip law (§8 Laws: `serialize ∘
//! deserialize = id`).

use crate::stream::{decode_stream_entry, encode_stream_entry};
use bai_core::{Event, KernelId, SessionId};
use proptest::prelude::*;

proptest! {
    #[test]
    fn kernel_pulling_round_trips_for_any_image_string(image in "[a-z0-9:./-]{1,64}", source in "[a-z]{1,16}") {
        let event = Event::KernelPulling { kernel_id: KernelId::new(), session_id: SessionId::new(), image: image.clone() };
        let bytes = encode_stream_entry(&event, &source).unwrap();
        let decoded = decode_stream_entry(&bytes).unwrap();
        prop_assert_eq!(decoded.source, source);
        match decoded.args {
            Event::KernelPulling { image: decoded_image, .. } => prop_assert_eq!(decoded_image, image),
            _ => prop_assert!(false, "expected KernelPulling variant"),
        }
    }
}
