// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;
use rust_decimal::Decimal;

fn image() -> Image {
    Image {
        canonical: "python:3.9".into(),
        architecture: "x86_64".into(),
        registry: "index.docker.io".into(),
        digest: "sha256:deadbeef".into(),
        labels: BTreeMap::new(),
        min_slots: ResourceSlots::from_pairs([
            ("cpu", Decimal::from(1)),
            ("mem", Decimal::from(1_000_000_000i64)),
        ]),
        max_slots: ResourceSlots::from_pairs([
            ("cpu", Decimal::from(8)),
            ("mem", Decimal::from(16_000_000_000i64)),
        ]),
    }
}

#[test]
fn requested_within_min_max_is_in_range() {
    let img = image();
    let requested = ResourceSlots::from_pairs([
        ("cpu", Decimal::from(2)),
        ("mem", Decimal::from(4_000_000_000i64)),
    ]);
    assert!(img.slots_in_range(&requested));
}

#[test]
fn requested_below_min_is_out_of_range() {
    let img = image();
    let requested =
        ResourceSlots::from_pairs([("cpu", Decimal::from(0)), ("mem", Decimal::from(500))]);
    assert!(!img.slots_in_range(&requested));
}

#[test]
fn requested_above_max_is_out_of_range() {
    let img = image();
    let requested = ResourceSlots::from_pairs([
        ("cpu", Decimal::from(16)),
        ("mem", Decimal::from(4_000_000_000i64)),
    ]);
    assert!(!img.slots_in_range(&requested));
}

#[test]
fn pull_key_combines_agent_and_canonical() {
    let img = image();
    assert_eq!(img.pull_key("agt-abc"), "agt-abc:python:3.9");
}
