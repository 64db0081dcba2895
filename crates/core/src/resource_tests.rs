// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;
use rust_decimal::Decimal;

fn slots(pairs: &[(&str, i64)]) -> ResourceSlots {
    ResourceSlots::from_pairs(pairs.iter().map(|(k, v)| (*k, Decimal::from(*v))))
}

#[test]
fn unknown_slot_reads_as_zero() {
    let s = slots(&[("cpu", 2)]);
    assert_eq!(s.get("mem"), Decimal::ZERO);
}

#[test]
fn add_sums_per_slot() {
    let a = slots(&[("cpu", 2), ("mem", 1024)]);
    let b = slots(&[("cpu", 1)]);
    let sum = &a + &b;
    assert_eq!(sum.get("cpu"), Decimal::from(3));
    assert_eq!(sum.get("mem"), Decimal::from(1024));
}

#[test]
fn sub_produces_delta_per_slot() {
    let a = slots(&[("cpu", 4)]);
    let b = slots(&[("cpu", 1)]);
    let diff = &a - &b;
    assert_eq!(diff.get("cpu"), Decimal::from(3));
}

#[test]
fn le_elementwise_true_when_every_slot_fits() {
    let requested = slots(&[("cpu", 2), ("mem", 1024)]);
    let available = slots(&[("cpu", 8), ("mem", 2048)]);
    assert!(requested.le_elementwise(&available));
}

#[test]
fn le_elementwise_false_when_one_slot_exceeds() {
    let requested = slots(&[("cpu", 2), ("mem", 4096)]);
    let available = slots(&[("cpu", 8), ("mem", 2048)]);
    assert!(!requested.le_elementwise(&available));
}

#[test]
fn names_subset_of_rejects_unknown_slot_name() {
    let requested = slots(&[("cpu", 2), ("tpu", 1)]);
    assert!(!requested.names_subset_of(&["cpu", "mem"]));
    let requested = slots(&[("cpu", 2)]);
    assert!(requested.names_subset_of(&["cpu", "mem"]));
}
