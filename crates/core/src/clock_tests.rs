// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;

#[test]
fn fake_clock_starts_at_fixed_epoch() {
    let clock = FakeClock::new();
    assert_eq!(clock.epoch_ms(), 1_000_000);
}

#[test]
fn advance_moves_both_instant_and_epoch() {
    let clock = FakeClock::new();
    let before = clock.now();
    clock.advance(Duration::from_millis(500));
    assert_eq!(clock.epoch_ms(), 1_000_500);
    assert_eq!(clock.now(), before + Duration::from_millis(500));
}

#[test]
fn set_epoch_ms_is_independent_of_instant() {
    let clock = FakeClock::new();
    let before = clock.now();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
    assert_eq!(clock.now(), before);
}

#[test]
fn clone_shares_the_same_underlying_clock() {
    let clock = FakeClock::new();
    let clone = clock.clone();
    clock.advance(Duration::from_secs(1));
    assert_eq!(clone.epoch_ms(), clock.epoch_ms());
}
